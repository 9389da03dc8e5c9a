//! Text generation.
//!
//! [`TextGenerator`] is the injected capability that turns a prompt into text.
//! [`GeminiClient`] implements it against the Gemini `generateContent` REST
//! endpoint. [`ContentWriter`] builds the bot's prompts and substitutes
//! templated fallbacks whenever generation fails, so a cycle never stalls on
//! the text service.

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use serde_json::{json, Value};

use crate::catalog::{LatestPost, Project};
use crate::config::mask_secret;
use crate::error::{BotError, BotResult};
use crate::segmenter::PLATFORM_POST_LIMIT;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Header carrying the API key, so it never appears in request URLs or errors.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Produces text for a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// # Returns
    ///
    /// - `Ok(String)`: The generated text, trimmed
    /// - `Err(BotError::Service)`: If the service fails or returns no text
    async fn generate(&self, prompt: &str) -> BotResult<String>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let model = model.into();
        info!("Initialized Gemini client for model {}", model);
        debug!("Gemini API key (masked): {}", mask_secret(&api_key));
        GeminiClient {
            client: Client::new(),
            api_key,
            model,
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    /// Points the client at another `models` base URL (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> BotResult<String> {
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        debug!("Sending prompt to Gemini: {}", preview(prompt, 100));

        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|e| BotError::service("gemini", e.without_url().to_string()))?;

        let status = response.status();
        info!("Received response with status: {} from Gemini", status);
        let body = response
            .text()
            .await
            .map_err(|e| BotError::service("gemini", e.without_url().to_string()))?;

        if !status.is_success() {
            error!("Gemini request failed with status {}", status);
            return Err(BotError::service(
                "gemini",
                format!("HTTP {}: {}", status, preview(&body, 200)),
            ));
        }

        let json: Value = serde_json::from_str(&body)?;
        extract_candidate_text(&json)
            .ok_or_else(|| BotError::service("gemini", "response contained no candidate text"))
    }
}

/// Reads `candidates[0].content.parts[0].text` from a `generateContent` response.
fn extract_candidate_text(response: &Value) -> Option<String> {
    let text = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()?
        .trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if sanitized.chars().count() > max_chars {
        let cut: String = sanitized.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        sanitized
    }
}

/// Writes project posts and comments, falling back to templates on failure.
pub struct ContentWriter {
    generator: Box<dyn TextGenerator>,
}

impl ContentWriter {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        ContentWriter { generator }
    }

    /// Generates a post about `project`. The result may exceed one post and
    /// is then published as a thread.
    pub async fn project_post(&self, project: &Project) -> String {
        info!("Generating post content for {}", project.name);
        info!(
            "Project details: Category: {}, Handle: {}",
            project.category, project.handle
        );

        match self.generator.generate(&project_prompt(project)).await {
            Ok(text) => {
                info!("Generated post content: {}", text);
                text
            }
            Err(e) => {
                error!("Error generating post content for {}: {}", project.name, e);
                info!("Using fallback post instead");
                fallback_project_post(project)
            }
        }
    }

    /// Generates a reply to `post`, cut to fit a single post.
    pub async fn comment(&self, post: &LatestPost) -> String {
        match self.generator.generate(&comment_prompt(post)).await {
            Ok(text) => {
                let comment = truncate_comment(&text);
                info!("Generated comment: {}", comment);
                comment
            }
            Err(e) => {
                error!("Error generating comment: {}", e);
                info!("Using fallback comment instead");
                fallback_comment(&post.username)
            }
        }
    }
}

pub fn project_prompt(project: &Project) -> String {
    format!(
        r#"You are a Web3 and blockchain expert. Create an English post about this project:

- Project Name: {name}
- X handle: {handle}
- Website: {website}
- Category: {category}

Rules:
1. Authentic, unique content that feels human-written
2. Analytical and interpretive approach (not just promotional)
3. No copy-paste, unique sentences
4. Thought-provoking questions/highlights
5. Insights connected to Web3 trends
6. If content exceeds 280 characters, it's fine - it will be posted as a thread
7. Emoji restriction: Max 2 emojis
8. Format:
   "Thoughts about the project...
   [Interesting question/highlight]
   {website}""#,
        name = project.name,
        handle = project.handle,
        website = project.website,
        category = project.category,
    )
}

pub fn comment_prompt(post: &LatestPost) -> String {
    format!(
        r#"Generate an engaging and relevant comment for the following post by @{username}:

Post: {text}

The comment must:
1. Be relevant to the post's content
2. Add value to the discussion
3. Be engaging but professional
4. Possibly include a thoughtful question
5. Be under 280 characters
6. Avoid generic responses
7. Be neither overly positive nor negative
8. Use emojis sparingly (max 1-2)

Format: Just provide the comment text directly, no additional context or explanations."#,
        username = post.username,
        text = post.text,
    )
}

pub fn fallback_project_post(project: &Project) -> String {
    format!(
        "Exploring {}'s innovative approach in {}. Check out their work at {}",
        project.name, project.category, project.website
    )
}

pub fn fallback_comment(username: &str) -> String {
    format!(
        "Interesting perspective @{}! This connects well with recent developments in the space.",
        username
    )
}

/// Cuts a comment longer than one post to 277 characters plus `...`.
pub fn truncate_comment(comment: &str) -> String {
    let comment = comment.trim();
    if comment.chars().count() > PLATFORM_POST_LIMIT {
        let cut: String = comment.chars().take(PLATFORM_POST_LIMIT - 3).collect();
        format!("{}...", cut)
    } else {
        comment.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedGenerator {
        reply: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, _prompt: &str) -> BotResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| BotError::service("gemini", "quota exhausted"))
        }
    }

    fn writer(reply: Option<&str>) -> (ContentWriter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let generator = ScriptedGenerator {
            reply: reply.map(str::to_string),
            calls: calls.clone(),
        };
        (ContentWriter::new(Box::new(generator)), calls)
    }

    fn allora() -> Project {
        Project {
            name: "Allora".to_string(),
            handle: "@AlloraNetwork".to_string(),
            website: "allora.network".to_string(),
            category: "AI + Blockchain".to_string(),
        }
    }

    fn post_by(username: &str) -> LatestPost {
        LatestPost {
            url: format!("https://x.com/{}/status/1", username),
            text: "Rollups are eating the world".to_string(),
            username: username.to_string(),
        }
    }

    #[tokio::test]
    async fn test_project_post_fallback() {
        let (writer, calls) = writer(None);
        let text = writer.project_post(&allora()).await;
        assert_eq!(
            text,
            "Exploring Allora's innovative approach in AI + Blockchain. Check out their work at allora.network"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_project_post_is_not_truncated() {
        let long = "word ".repeat(120);
        let (writer, _) = writer(Some(&long));
        assert_eq!(writer.project_post(&allora()).await, long);
    }

    #[tokio::test]
    async fn test_comment_fallback() {
        let (writer, _) = writer(None);
        assert_eq!(
            writer.comment(&post_by("laurashin")).await,
            "Interesting perspective @laurashin! This connects well with recent developments in the space."
        );
    }

    #[tokio::test]
    async fn test_long_comment_is_truncated() {
        let long = "a".repeat(400);
        let (writer, _) = writer(Some(&long));
        let comment = writer.comment(&post_by("hosseeb")).await;
        assert_eq!(comment.chars().count(), 280);
        assert!(comment.ends_with("..."));
        assert_eq!(&comment[..277], &long[..277]);
    }

    #[test]
    fn test_truncate_comment_keeps_short_text() {
        assert_eq!(truncate_comment("  short reply  "), "short reply");
        let exact = "b".repeat(280);
        assert_eq!(truncate_comment(&exact), exact);
    }

    #[test]
    fn test_prompts_mention_their_subject() {
        let prompt = project_prompt(&allora());
        assert!(prompt.contains("Allora"));
        assert!(prompt.contains("@AlloraNetwork"));
        assert!(prompt.trim_end().ends_with("allora.network\""));

        let prompt = comment_prompt(&post_by("QwQiao"));
        assert!(prompt.contains("@QwQiao"));
        assert!(prompt.contains("Rollups are eating the world"));
    }

    #[test]
    fn test_extract_candidate_text() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "  Hello from the model \n" }] }
            }]
        });
        assert_eq!(
            extract_candidate_text(&response),
            Some("Hello from the model".to_string())
        );
        assert_eq!(extract_candidate_text(&json!({ "candidates": [] })), None);
        assert_eq!(
            extract_candidate_text(&json!({
                "candidates": [{ "content": { "parts": [{ "text": "   " }] } }]
            })),
            None
        );
    }

    #[test]
    fn test_endpoint_uses_model() {
        let client = GeminiClient::new("key", "gemini-1.5-flash");
        assert_eq!(
            client.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(!client.endpoint().contains("key"));
    }

    #[tokio::test]
    async fn test_request_errors_do_not_leak_api_key() {
        let client = GeminiClient::new("SECRET-API-KEY-123", "gemini-1.5-flash")
            .with_base_url("http://127.0.0.1:9/v1beta/models/");
        assert_eq!(
            client.endpoint(),
            "http://127.0.0.1:9/v1beta/models/gemini-1.5-flash:generateContent"
        );

        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, BotError::Service { service: "gemini", .. }));
        assert!(!err.to_string().contains("SECRET-API-KEY-123"));
    }
}
