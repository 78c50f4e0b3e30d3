//! # gemini-image-rs
//!
//! Async Rust client for Gemini image generation.
//!
//! Wraps the single point of contact with the hosted image model: build a
//! request from a prompt plus optional reference images, make one
//! `generateContent` call, and return raw image bytes or a typed
//! [`GenerationError`].
//!
//! Retries and timeouts are deliberately left to the caller. Every error
//! knows whether it is worth retrying via [`GenerationError::is_retryable`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use gemini_image_rs::{GeminiClient, ImageGenerator, ImageRequest, ReferenceImage};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GeminiClient::new(std::env::var("GOOGLE_API_KEY")?);
//!
//! let style = std::fs::read("style.png")?;
//! let request = ImageRequest::new("Create a cozy reading nook, large serif text 'SLOW DOWN'")
//!     .reference(ReferenceImage::new("image/png", style))
//!     .aspect_ratio("4:5");
//!
//! let bytes = tokio::time::timeout(Duration::from_secs(60), client.generate(&request)).await??;
//! std::fs::write("slide_01.png", &bytes)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod request;
pub mod types;

pub use client::{
    parse_image_response, parse_text_response, GeminiClient, DEFAULT_API_BASE,
    DEFAULT_IMAGE_MODEL,
};
pub use error::{GenerationError, Result};
pub use request::ImageRequest;
pub use types::{HarmCategory, HarmThreshold, ReferenceImage, SafetySetting};

/// Anything that can turn an [`ImageRequest`] into image bytes.
///
/// Implementations make exactly one attempt per call. The returned future
/// must be safe to drop at any point; that is how callers cancel.
///
/// # Example
///
/// ```
/// use gemini_image_rs::{ImageGenerator, ImageRequest, Result};
///
/// struct SolidColor;
///
/// impl ImageGenerator for SolidColor {
///     async fn generate(&self, _request: &ImageRequest) -> Result<Vec<u8>> {
///         Ok(vec![0xFF; 16])
///     }
/// }
/// ```
pub trait ImageGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        request: &ImageRequest,
    ) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}
