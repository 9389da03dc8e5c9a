//! Thread segmentation for long posts.
//!
//! This module splits text that does not fit into a single post into an
//! ordered sequence of chunks, each small enough to be published as one part
//! of a thread. Splits prefer sentence endings, then word boundaries, and only
//! cut through a word when nothing else is available.

use log::{debug, info, warn};

/// Maximum number of characters a single post may contain.
pub const PLATFORM_POST_LIMIT: usize = 280;

/// Characters held back from the limit for URLs, emojis and other
/// client-side rendering differences.
pub const SAFETY_MARGIN: usize = 20;

/// One part of a segmented post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the chunk within the thread (0-based)
    pub index: usize,
    /// Trimmed text of the chunk
    pub text: String,
}

impl Chunk {
    /// Length of the chunk in characters.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Returns `true` if the chunk holds no text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits `content` into thread-sized chunks.
///
/// Text that already fits into a single post of `limit` characters is
/// returned whole (trimmed). Longer text is split so that every chunk fits
/// into `limit` minus [`SAFETY_MARGIN`] characters:
///
/// 1. Scan backward from `effective_limit - SAFETY_MARGIN` for a sentence
///    ending (`.`, `!` or `?` followed by a space or newline); the
///    punctuation stays with the emitted chunk.
/// 2. Without a sentence ending, use the last whitespace seen during the
///    same scan.
/// 3. Without either, cut the token at `effective_limit - SAFETY_MARGIN`.
///
/// Both sides of every split are trimmed, and the loop continues on the
/// remainder. All lengths are counted in characters, not bytes.
///
/// # Parameters
///
/// - `content`: The text to split
/// - `limit`: The platform's maximum post length (normally [`PLATFORM_POST_LIMIT`])
///
/// # Returns
///
/// The ordered chunks. Empty or whitespace-only input yields an empty vector.
///
/// # Example
///
/// ```rust
/// use autoposter::segmenter::segment;
///
/// let chunks = segment("Short and sweet.", 280);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "Short and sweet.");
/// ```
pub fn segment(content: &str, limit: usize) -> Vec<Chunk> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.chars().count() <= limit {
        return vec![Chunk {
            index: 0,
            text: trimmed.to_string(),
        }];
    }

    let effective_limit = limit.saturating_sub(SAFETY_MARGIN).max(1);
    let window = scan_window(effective_limit);

    let mut parts: Vec<String> = Vec::new();
    let mut remaining: Vec<char> = trimmed.chars().collect();

    while !remaining.is_empty() {
        if remaining.len() <= effective_limit {
            parts.push(remaining.iter().collect());
            break;
        }

        let split_at = find_split_point(&remaining, window);
        let (head, tail) = remaining.split_at(split_at);

        let head = trim_chars(head);
        if !head.is_empty() {
            parts.push(head.iter().collect());
        }
        remaining = trim_chars(tail).to_vec();
    }

    // Re-check every part and force-split anything that still overflows.
    let mut i = 0;
    while i < parts.len() {
        let chars: Vec<char> = parts[i].chars().collect();
        if chars.len() > effective_limit {
            warn!(
                "Thread part {} exceeds limit ({} chars), forcing split",
                i + 1,
                chars.len()
            );
            let (head, tail) = chars.split_at(window);
            parts[i] = trim_chars(head).iter().collect();
            let tail: String = trim_chars(tail).iter().collect();
            if !tail.is_empty() {
                parts.insert(i + 1, tail);
            }
        }
        i += 1;
    }

    let chunks: Vec<Chunk> = parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .enumerate()
        .map(|(index, text)| Chunk { index, text })
        .collect();

    info!("Split content into {} thread parts", chunks.len());
    for chunk in &chunks {
        let preview: String = chunk.text.chars().take(30).collect();
        debug!(
            "Thread part {}: {}... ({} chars)",
            chunk.index + 1,
            preview,
            chunk.len()
        );
    }

    chunks
}

/// Position the backward scan starts from, which is also the forced-split
/// position. Never zero, so every split makes progress.
fn scan_window(effective_limit: usize) -> usize {
    if effective_limit > SAFETY_MARGIN {
        effective_limit - SAFETY_MARGIN
    } else {
        effective_limit
    }
}

/// Finds the index at which `text` should be split.
///
/// `text` must be trimmed and longer than `window`.
fn find_split_point(text: &[char], window: usize) -> usize {
    let start = window.min(text.len() - 1);
    let mut word_boundary = None;

    for i in (1..=start).rev() {
        if is_sentence_end(text[i - 1], text[i]) {
            return i;
        }
        if word_boundary.is_none() && text[i].is_whitespace() {
            word_boundary = Some(i);
        }
    }

    match word_boundary {
        Some(i) => i,
        None => {
            debug!("No sentence or word boundary found, forcing split at {}", window);
            window
        }
    }
}

fn is_sentence_end(punct: char, next: char) -> bool {
    matches!(punct, '.' | '!' | '?') && matches!(next, ' ' | '\n')
}

fn trim_chars(chars: &[char]) -> &[char] {
    let start = chars
        .iter()
        .position(|c| !c.is_whitespace())
        .unwrap_or(chars.len());
    let end = chars
        .iter()
        .rposition(|c| !c.is_whitespace())
        .map_or(start, |i| i + 1);
    &chars[start..end]
}
