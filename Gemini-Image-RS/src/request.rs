use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};

use crate::error::{GenerationError, Result};
use crate::types::{ReferenceImage, SafetySetting};

/// A single image-generation request.
///
/// # Example
/// ```
/// use gemini_image_rs::{ImageRequest, ReferenceImage};
///
/// let request = ImageRequest::new("a lighthouse at dusk, watercolor")
///     .reference(ReferenceImage::new("image/png", vec![1u8, 2, 3]))
///     .aspect_ratio("4:5");
///
/// let body = request.build_body(&[]).unwrap();
/// let parts = body["contents"][0]["parts"].as_array().unwrap();
/// assert_eq!(parts.len(), 2); // reference image + text
/// ```
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub references: Vec<ReferenceImage>,
    pub aspect_ratio: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            references: Vec::new(),
            aspect_ratio: None,
        }
    }

    /// Attach one reference image. References are sent before the text part,
    /// in the order they were attached.
    pub fn reference(mut self, image: ReferenceImage) -> Self {
        self.references.push(image);
        self
    }

    pub fn references(mut self, images: impl IntoIterator<Item = ReferenceImage>) -> Self {
        self.references.extend(images);
        self
    }

    /// Set the target aspect ratio (e.g. "1:1", "4:5", "9:16").
    pub fn aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }

    /// Build the `generateContent` JSON body.
    pub fn build_body(&self, safety: &[SafetySetting]) -> Result<Value> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("prompt is empty".into()));
        }

        let mut parts: Vec<Value> = self
            .references
            .iter()
            .map(|r| {
                json!({
                    "inlineData": {
                        "mimeType": r.mime_type,
                        "data": BASE64.encode(&r.data),
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": self.prompt }));

        let mut generation_config = json!({
            "responseModalities": ["IMAGE"],
        });
        if let Some(ratio) = self.aspect_ratio.as_deref().filter(|r| !r.is_empty()) {
            generation_config["imageConfig"] = json!({ "aspectRatio": ratio });
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": generation_config,
        });
        if !safety.is_empty() {
            body["safetySettings"] = serde_json::to_value(safety)?;
        }
        Ok(body)
    }
}
