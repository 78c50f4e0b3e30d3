use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::{GenerationError, Result};
use crate::request::ImageRequest;
use crate::types::{HarmThreshold, SafetySetting};
use crate::ImageGenerator;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

const SAFETY_FINISH_REASONS: &[&str] = &["SAFETY", "IMAGE_SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST"];

fn normalize(api_base: String) -> String {
    api_base.trim_end_matches('/').to_string()
}

/// Async client for the Gemini `generateContent` endpoint.
///
/// Every call is a single attempt. There is no retry loop and no default
/// timeout here: callers wrap [`GeminiClient::generate_image`] in their own
/// timeout, and dropping the future aborts the in-flight request.
///
/// # Example
/// ```no_run
/// use gemini_image_rs::{GeminiClient, ImageRequest};
///
/// # async fn example() -> gemini_image_rs::Result<()> {
/// let client = GeminiClient::new("my-api-key");
/// let bytes = client
///     .generate_image(&ImageRequest::new("a red fox, paper cut-out style"))
///     .await?;
/// std::fs::write("fox.png", &bytes).unwrap();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_base: String,
    api_key: String,
    image_model: String,
    safety: Vec<SafetySetting>,
    request_timeout: Option<Duration>,
}

impl GeminiClient {
    /// Create a client with the default API base, image model and safety settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: api_key.into(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            safety: SafetySetting::uniform(HarmThreshold::BlockOnlyHigh),
            request_timeout: None,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = normalize(api_base.into());
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_safety_settings(mut self, safety: Vec<SafetySetting>) -> Self {
        self.safety = safety;
        self
    }

    /// Apply a transport-level timeout to every request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn image_model(&self) -> &str {
        &self.image_model
    }

    pub fn safety_settings(&self) -> &[SafetySetting] {
        &self.safety
    }

    /// Full `generateContent` URL for a model name, with or without the
    /// `models/` prefix.
    pub fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{}", trimmed)
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    /// POST a raw `generateContent` body and return the JSON response.
    pub async fn generate_content(&self, model: &str, body: &Value) -> Result<Value> {
        let url = self.endpoint_for_model(model);
        let mut req = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body);
        if let Some(timeout) = self.request_timeout {
            req = req.timeout(timeout);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout
            } else {
                GenerationError::Network {
                    context: format!("Cannot reach Gemini at {}", self.api_base),
                    source: e,
                }
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body_text = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Http {
                status,
                body: body_text,
            });
        }

        resp.json().await.map_err(|e| GenerationError::Network {
            context: "Failed to read Gemini response".into(),
            source: e,
        })
    }

    /// Generate one image. Returns the raw image bytes of the first inline
    /// image part.
    pub async fn generate_image(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        let body = request.build_body(&self.safety)?;
        tracing::debug!(
            model = %self.image_model,
            references = request.references.len(),
            prompt_chars = request.prompt.len(),
            "Calling Gemini image model"
        );
        let json = self.generate_content(&self.image_model, &body).await?;
        let bytes = parse_image_response(&json)?;
        tracing::debug!(bytes = bytes.len(), "Gemini returned image");
        Ok(bytes)
    }
}

impl ImageGenerator for GeminiClient {
    async fn generate(&self, request: &ImageRequest) -> Result<Vec<u8>> {
        self.generate_image(request).await
    }
}

/// Extract image bytes from a `generateContent` response.
///
/// Accepts both `inlineData` and `inline_data` spellings. A prompt-level
/// block or a safety finish reason without any image maps to
/// [`GenerationError::SafetyBlocked`].
pub fn parse_image_response(json: &Value) -> Result<Vec<u8>> {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(|v| v.as_str())
    {
        return Err(GenerationError::SafetyBlocked(reason.to_string()));
    }

    let candidates = match json.get("candidates").and_then(|c| c.as_array()) {
        Some(c) if !c.is_empty() => c,
        _ => return Err(GenerationError::NoCandidates),
    };

    let mut blocked: Option<String> = None;
    for candidate in candidates {
        let parts = candidate
            .pointer("/content/parts")
            .and_then(|p| p.as_array())
            .map(|p| p.as_slice())
            .unwrap_or_default();

        for part in parts {
            let data = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(|inline| inline.get("data"))
                .and_then(|d| d.as_str())
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            return BASE64
                .decode(data.as_bytes())
                .map_err(|e| GenerationError::Decode(e.to_string()));
        }

        if let Some(reason) = candidate.get("finishReason").and_then(|r| r.as_str()) {
            if SAFETY_FINISH_REASONS.contains(&reason) {
                blocked = Some(reason.to_string());
            }
        }
    }

    match blocked {
        Some(reason) => Err(GenerationError::SafetyBlocked(reason)),
        None => Err(GenerationError::NoContent),
    }
}

/// Concatenate the text parts of the first candidate.
pub fn parse_text_response(json: &Value) -> Result<String> {
    if let Some(reason) = json
        .pointer("/promptFeedback/blockReason")
        .and_then(|v| v.as_str())
    {
        return Err(GenerationError::SafetyBlocked(reason.to_string()));
    }

    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or(GenerationError::NoCandidates)?;

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(GenerationError::NoContent);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_for_model() {
        let client = GeminiClient::new("k").with_api_base("http://localhost:9000/v1beta/");
        assert_eq!(
            client.endpoint_for_model("gemini-2.5-flash-image"),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash-image:generateContent"
        );
        assert_eq!(
            client.endpoint_for_model("models/gemini-2.5-flash"),
            "http://localhost:9000/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_parse_inline_data() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here you go" },
                    { "inlineData": { "mimeType": "image/png", "data": BASE64.encode(b"PNGDATA") } }
                ]}
            }]
        });
        assert_eq!(parse_image_response(&json).unwrap(), b"PNGDATA".to_vec());
    }

    #[test]
    fn test_parse_snake_case_inline_data() {
        let json = json!({
            "candidates": [{
                "content": { "parts": [
                    { "inline_data": { "mime_type": "image/png", "data": BASE64.encode(b"abc") } }
                ]}
            }]
        });
        assert_eq!(parse_image_response(&json).unwrap(), b"abc".to_vec());
    }

    #[test]
    fn test_parse_no_candidates() {
        let err = parse_image_response(&json!({ "candidates": [] })).unwrap_err();
        assert!(matches!(err, GenerationError::NoCandidates));
        let err = parse_image_response(&json!({})).unwrap_err();
        assert!(matches!(err, GenerationError::NoCandidates));
    }

    #[test]
    fn test_parse_text_only_is_no_content() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "I cannot draw that" }] } }]
        });
        assert!(matches!(
            parse_image_response(&json).unwrap_err(),
            GenerationError::NoContent
        ));
    }

    #[test]
    fn test_parse_safety_block() {
        let json = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            parse_image_response(&json).unwrap_err(),
            GenerationError::SafetyBlocked(r) if r == "SAFETY"
        ));

        let json = json!({ "candidates": [{ "finishReason": "IMAGE_SAFETY" }] });
        assert!(matches!(
            parse_image_response(&json).unwrap_err(),
            GenerationError::SafetyBlocked(r) if r == "IMAGE_SAFETY"
        ));
    }

    #[test]
    fn test_parse_bad_base64() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "inlineData": { "data": "!!not base64!!" } }] } }]
        });
        assert!(matches!(
            parse_image_response(&json).unwrap_err(),
            GenerationError::Decode(_)
        ));
    }

    #[test]
    fn test_parse_text_response() {
        let json = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": " 1}" }] } }]
        });
        assert_eq!(parse_text_response(&json).unwrap(), "{\"a\": 1}");
        assert!(matches!(
            parse_text_response(&json!({ "candidates": [] })).unwrap_err(),
            GenerationError::NoCandidates
        ));
    }
}
