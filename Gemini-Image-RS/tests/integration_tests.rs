use base64::Engine;
use gemini_image_rs::*;
use serde_json::json;
use std::path::Path;

struct FailingGenerator;

impl ImageGenerator for FailingGenerator {
    async fn generate(&self, _request: &ImageRequest) -> Result<Vec<u8>> {
        Err(GenerationError::NoCandidates)
    }
}

#[test]
fn test_client_defaults() {
    let client = GeminiClient::new("key");
    assert_eq!(client.api_base(), DEFAULT_API_BASE);
    assert_eq!(client.image_model(), DEFAULT_IMAGE_MODEL);
    assert_eq!(client.safety_settings().len(), 4);
}

#[test]
fn test_client_builder() {
    let client = GeminiClient::new("key")
        .with_api_base("http://127.0.0.1:8080/")
        .with_image_model("custom-image")
        .with_safety_settings(vec![]);
    assert_eq!(client.api_base(), "http://127.0.0.1:8080");
    assert_eq!(client.image_model(), "custom-image");
    assert!(client.safety_settings().is_empty());
}

#[test]
fn test_request_body_with_style_and_persona_refs() {
    let style = ReferenceImage::new("image/png", vec![1u8, 2, 3]);
    let persona = ReferenceImage::new("image/jpeg", vec![4u8, 5]);
    let body = ImageRequest::new("portrait")
        .references(vec![style, persona])
        .aspect_ratio("1:1")
        .build_body(&SafetySetting::uniform(HarmThreshold::BlockNone))
        .unwrap();

    let parts = body["contents"][0]["parts"].as_array().unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
    assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
    assert_eq!(parts[2]["text"], "portrait");
    assert_eq!(body["generationConfig"]["responseModalities"][0], "IMAGE");
    assert_eq!(body["safetySettings"][3]["threshold"], "BLOCK_NONE");
}

#[test]
fn test_round_trip_response_parsing() {
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"\x89PNG");
    let response = json!({
        "candidates": [{
            "content": { "parts": [{ "inlineData": { "mimeType": "image/png", "data": encoded } }] },
            "finishReason": "STOP"
        }]
    });
    assert_eq!(parse_image_response(&response).unwrap(), b"\x89PNG".to_vec());
}

#[test]
fn test_mime_for_path() {
    assert_eq!(ReferenceImage::mime_for_path(Path::new("a.JPG")), "image/jpeg");
    assert_eq!(ReferenceImage::mime_for_path(Path::new("a.jpeg")), "image/jpeg");
    assert_eq!(ReferenceImage::mime_for_path(Path::new("a.webp")), "image/webp");
    assert_eq!(ReferenceImage::mime_for_path(Path::new("a.png")), "image/png");
    assert_eq!(ReferenceImage::mime_for_path(Path::new("noext")), "image/png");
}

#[tokio::test]
async fn test_mock_generator_error_is_retryable() {
    let gen = FailingGenerator;
    let err = gen.generate(&ImageRequest::new("x")).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let client = GeminiClient::new("key").with_api_base("http://127.0.0.1:1");
    let err = client
        .generate_image(&ImageRequest::new("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Network { .. }));
    assert!(err.is_retryable());
}
