use std::future::Future;
use std::time::Duration;

use gemini_image_rs::{parse_text_response, GeminiClient, GenerationError};
use image_batch_runner::RetryPolicy;
use serde_json::{json, Value};

use crate::error::Result;

pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for text-model requests.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Ask the model for `application/json` output.
    pub json_mode: bool,

    /// Timeout for a single text request.
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            json_mode: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl LlmConfig {
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// The text-generation collaborator used by the analysis, direction, copy
/// and prompt stages.
pub trait TextGenerator: Send + Sync + 'static {
    fn generate_text(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// [`TextGenerator`] backed by a Gemini text model.
///
/// Each request is bounded by [`LlmConfig::timeout`] and retried with the
/// same backoff policy used for images.
#[derive(Debug, Clone)]
pub struct GeminiTextClient {
    client: GeminiClient,
    model: String,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl GeminiTextClient {
    pub fn new(client: GeminiClient) -> Self {
        Self {
            client,
            model: DEFAULT_TEXT_MODEL.to_string(),
            config: LlmConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn attempt(&self, body: &Value) -> std::result::Result<String, GenerationError> {
        let json = tokio::time::timeout(
            self.config.timeout,
            self.client.generate_content(&self.model, body),
        )
        .await??;
        parse_text_response(&json)
    }
}

/// `generateContent` body for a single-turn text request.
pub fn build_text_body(prompt: &str, config: &LlmConfig) -> Value {
    let mut body = json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }],
        }],
        "generationConfig": {
            "temperature": config.temperature,
            "maxOutputTokens": config.max_tokens,
        },
    });

    if config.json_mode {
        body["generationConfig"]["responseMimeType"] = json!("application/json");
    }
    body
}

impl TextGenerator for GeminiTextClient {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let body = build_text_body(prompt, &self.config);
        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Calling text model");
        let text = self.retry.run(|_| self.attempt(&body)).await?;
        tracing::debug!(chars = text.len(), "Text model responded");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tokens, 2048);
        assert!(!config.json_mode);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_llm_config_builder() {
        let config = LlmConfig::default()
            .with_temperature(0.3)
            .with_max_tokens(4096)
            .with_json_mode(true)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.temperature, 0.3);
        assert_eq!(config.max_tokens, 4096);
        assert!(config.json_mode);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_text_body() {
        let body = build_text_body("Analyze this", &LlmConfig::default());
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Analyze this");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
        assert!(body["generationConfig"].get("responseMimeType").is_none());

        let body = build_text_body("x", &LlmConfig::default().with_json_mode(true));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_text_client_defaults() {
        let client = GeminiTextClient::new(GeminiClient::new("key")).with_model("gemini-2.0-flash");
        assert_eq!(client.model(), "gemini-2.0-flash");
        assert!(!client.config().json_mode);
    }
}
