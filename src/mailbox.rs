//! Verification code lookup.
//!
//! When the platform asks for a confirmation code during login, the code is
//! read from the account's mailbox. This module contains the injected
//! [`CodeLookup`] capability, an IMAP implementation, and the pure functions
//! that pull the code out of a message.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use mailparse::{MailHeaderMap, ParsedMail};
use regex::Regex;
use std::io::{Read, Write};
use std::sync::OnceLock;

use crate::config::Credentials;
use crate::error::{BotError, BotResult};

/// Port for IMAP over TLS.
pub const IMAP_TLS_PORT: u16 = 993;

/// Source of one-time verification codes.
#[async_trait]
pub trait CodeLookup: Send + Sync {
    /// Performs one search pass for a verification code.
    ///
    /// # Returns
    ///
    /// - `Some(code)`: A code was found (and its message marked as read)
    /// - `None`: No matching message, or the lookup failed (failures are logged)
    async fn fetch_verification_code(&self) -> Option<String>;
}

/// How strictly a search result is inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    /// Code must be in the subject, exactly as `... confirmation code is <code>`
    ExactSubject,
    /// Subject first, then known phrases in the body
    SubjectOrBody,
}

/// IMAP searches in the order they are tried.
const SEARCHES: &[(&str, MatchMode)] = &[
    (
        r#"SUBJECT "Your X confirmation code is""#,
        MatchMode::ExactSubject,
    ),
    (
        r#"FROM "info@x.com" SUBJECT "confirmation code""#,
        MatchMode::SubjectOrBody,
    ),
    (
        r#"SUBJECT "Your X confirmation code""#,
        MatchMode::SubjectOrBody,
    ),
];

/// Body phrases that carry a code.
const BODY_PATTERNS: &[&str] = &[
    r"confirmation code is (\w+)",
    r"verification code is (\w+)",
    r"Your X confirmation code is (\w+)",
];

static SUBJECT_CODE: OnceLock<Option<Regex>> = OnceLock::new();
static LOOSE_SUBJECT_CODE: OnceLock<Option<Regex>> = OnceLock::new();
static BODY_CODES: OnceLock<Vec<Regex>> = OnceLock::new();

/// Compiles `pattern` on first use.
fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn body_codes() -> &'static [Regex] {
    BODY_CODES.get_or_init(|| {
        BODY_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

/// Extracts the code from a subject like `Your X confirmation code is b7q3ve6g`.
pub fn extract_code_from_subject(subject: &str) -> Option<String> {
    let re = cached(&SUBJECT_CODE, r"confirmation code is (\w+)")?;
    first_capture(re, subject)
}

/// Extracts a code from a message body using the known phrases.
pub fn extract_code_from_body(body: &str) -> Option<String> {
    body_codes().iter().find_map(|re| first_capture(re, body))
}

/// Extracts a code from a raw RFC 822 message.
fn extract_code_from_message(raw: &[u8], mode: MatchMode) -> Option<String> {
    let parsed = match mailparse::parse_mail(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Failed to parse email: {}", e);
            return None;
        }
    };

    let subject = parsed.headers.get_first_value("Subject").unwrap_or_default();
    info!("Email subject: {}", subject);

    match mode {
        MatchMode::ExactSubject => extract_code_from_subject(&subject),
        MatchMode::SubjectOrBody => {
            if subject.contains("confirmation code is") {
                let re = cached(&LOOSE_SUBJECT_CODE, r"code is (\w+)")?;
                if let Some(code) = first_capture(re, &subject) {
                    return Some(code);
                }
            }
            text_bodies(&parsed)
                .iter()
                .find_map(|body| extract_code_from_body(body))
        }
    }
}

/// Collects every `text/plain` and `text/html` body in a message.
fn text_bodies(part: &ParsedMail<'_>) -> Vec<String> {
    let mut bodies = Vec::new();
    if part.subparts.is_empty() {
        let mimetype = part.ctype.mimetype.to_lowercase();
        if mimetype == "text/plain" || mimetype == "text/html" {
            match part.get_body() {
                Ok(body) => bodies.push(body),
                Err(e) => error!("Error processing email part: {}", e),
            }
        }
    } else {
        for sub in &part.subparts {
            bodies.extend(text_bodies(sub));
        }
    }
    bodies
}

/// Looks up codes in an IMAP mailbox (Gmail by default).
pub struct ImapCodeLookup {
    host: String,
    port: u16,
    email_address: String,
    password: String,
}

impl ImapCodeLookup {
    pub fn new(host: impl Into<String>, credentials: &Credentials) -> Self {
        ImapCodeLookup {
            host: host.into(),
            port: IMAP_TLS_PORT,
            email_address: credentials.email_address.clone(),
            password: credentials.email_password.clone(),
        }
    }
}

#[async_trait]
impl CodeLookup for ImapCodeLookup {
    async fn fetch_verification_code(&self) -> Option<String> {
        info!("Connecting to {} to get X verification code", self.host);

        let host = self.host.clone();
        let port = self.port;
        let email_address = self.email_address.clone();
        let password = self.password.clone();

        // The IMAP client is blocking.
        let result = tokio::task::spawn_blocking(move || {
            search_mailbox(&host, port, &email_address, &password)
        })
        .await;

        match result {
            Ok(Ok(Some(code))) => {
                info!("Retrieved verification code from mailbox");
                Some(code)
            }
            Ok(Ok(None)) => {
                warn!("Could not find any X verification code in emails");
                None
            }
            Ok(Err(e)) => {
                error!("Error retrieving X verification code: {}", e);
                None
            }
            Err(e) => {
                error!("Mailbox lookup task failed: {}", e);
                None
            }
        }
    }
}

fn mailbox_error(e: impl std::fmt::Display) -> BotError {
    BotError::service("mailbox", e.to_string())
}

fn search_mailbox(
    host: &str,
    port: u16,
    email_address: &str,
    password: &str,
) -> BotResult<Option<String>> {
    let tls = native_tls::TlsConnector::builder()
        .build()
        .map_err(mailbox_error)?;
    let client = imap::connect((host, port), host, &tls).map_err(mailbox_error)?;
    let mut session = client
        .login(email_address, password)
        .map_err(|(e, _client)| mailbox_error(e))?;
    info!("Successfully connected to mailbox");

    let result = scan_inbox(&mut session);

    if let Err(e) = session.logout() {
        debug!("IMAP logout failed: {}", e);
    }
    result
}

fn scan_inbox<T: Read + Write>(session: &mut imap::Session<T>) -> BotResult<Option<String>> {
    session.select("INBOX").map_err(mailbox_error)?;

    for (query, mode) in SEARCHES {
        info!("Searching mailbox with criteria: {}", query);
        let ids = session.search(query).map_err(mailbox_error)?;
        let latest = match ids.iter().max() {
            Some(id) => id.to_string(),
            None => continue,
        };
        info!("Found matching email with ID: {}", latest);

        let messages = session.fetch(&latest, "RFC822").map_err(mailbox_error)?;
        let code = messages
            .iter()
            .filter_map(|message| message.body())
            .find_map(|raw| extract_code_from_message(raw, *mode));

        if let Some(code) = code {
            info!("Extracted confirmation code from email {}", latest);
            session
                .store(&latest, "+FLAGS (\\Seen)")
                .map_err(mailbox_error)?;
            return Ok(Some(code));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_code_from_subject() {
        assert_eq!(
            extract_code_from_subject("Your X confirmation code is b7q3ve6g"),
            Some("b7q3ve6g".to_string())
        );
        assert_eq!(extract_code_from_subject("Welcome to X"), None);
        assert_eq!(extract_code_from_subject("Your confirmation code is"), None);
    }

    #[test]
    fn test_extract_code_from_body_patterns() {
        assert_eq!(
            extract_code_from_body("Hi! Your verification code is 482913. Thanks"),
            Some("482913".to_string())
        );
        assert_eq!(
            extract_code_from_body("<p>Your X confirmation code is abc123</p>"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_code_from_body("Nothing to see here"), None);
    }

    #[test]
    fn test_patterns_compile_once() {
        assert_eq!(body_codes().len(), BODY_PATTERNS.len());
        let first = cached(&SUBJECT_CODE, r"confirmation code is (\w+)");
        assert!(first.is_some());
        extract_code_from_subject("Your X confirmation code is a1");
        let again = cached(&SUBJECT_CODE, r"confirmation code is (\w+)");
        assert!(std::ptr::eq(first.unwrap(), again.unwrap()));
        assert!(std::ptr::eq(body_codes(), body_codes()));
    }

    #[test]
    fn test_exact_subject_message() {
        let raw = b"From: info@x.com\r\nSubject: Your X confirmation code is k2m9pq\r\nContent-Type: text/plain\r\n\r\nIgnore the body\r\n";
        assert_eq!(
            extract_code_from_message(raw, MatchMode::ExactSubject),
            Some("k2m9pq".to_string())
        );
    }

    #[test]
    fn test_exact_mode_ignores_body() {
        let raw = b"Subject: Confirm your login\r\nContent-Type: text/plain\r\n\r\nYour verification code is 123456\r\n";
        assert_eq!(extract_code_from_message(raw, MatchMode::ExactSubject), None);
        assert_eq!(
            extract_code_from_message(raw, MatchMode::SubjectOrBody),
            Some("123456".to_string())
        );
    }

    #[test]
    fn test_multipart_body_is_searched() {
        let raw = concat!(
            "Subject: Your X confirmation code\r\n",
            "MIME-Version: 1.0\r\n",
            "Content-Type: multipart/alternative; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Please enter this confirmation code is zz88yy to continue\r\n",
            "--sep\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<b>zz88yy</b>\r\n",
            "--sep--\r\n"
        );
        assert_eq!(
            extract_code_from_message(raw.as_bytes(), MatchMode::SubjectOrBody),
            Some("zz88yy".to_string())
        );
    }

    #[test]
    fn test_searches_start_with_exact_subject() {
        assert_eq!(SEARCHES[0].1, MatchMode::ExactSubject);
        assert!(SEARCHES[1..]
            .iter()
            .all(|(_, mode)| *mode == MatchMode::SubjectOrBody));
    }
}
