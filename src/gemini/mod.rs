use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    imaging::EncodedImage,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_VIDEO_MODEL: &str = "veo-3.0-generate-001";

const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(10);
const VIDEO_POLL_LIMIT: u32 = 60;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub image_model: String,
    pub video_model: String,
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let image_model = std::env::var("GEMINI_IMAGE_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());
        let video_model = std::env::var("GEMINI_VIDEO_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string());

        Self {
            api_key,
            image_model,
            video_model,
        }
    }

    fn require_api_key(&self) -> AppResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::msg("GEMINI_API_KEY is missing. Add it to .env"))
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http_client: reqwest::Client,
    config: GeminiConfig,
}

#[derive(Debug, Clone)]
pub struct GenerateImageRequest {
    pub prompt: String,
    pub reference_image: Option<EncodedImage>,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GenerateVideoRequest {
    pub prompt: String,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
    pub reference_image: Option<EncodedImage>,
}

#[derive(Debug, Clone)]
pub struct GeminiResponse {
    pub model: String,
    pub text: Option<String>,
    pub images: Vec<EncodedImage>,
    pub sanitized_payload: Value,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
        }
    }

    /// One image generation or edit call. A request with a reference image is
    /// an edit: the image rides along as an inline part ahead of the prompt.
    pub async fn generate_image(&self, request: GenerateImageRequest) -> AppResult<GeminiResponse> {
        let payload = build_image_payload(&request);
        let payload_value = serde_json::to_value(&payload)?;
        let sanitized_payload = sanitize_payload(payload_value.clone());
        tracing::debug!(model = %self.config.image_model, payload = %sanitized_payload, "gemini image request");

        let url = format!(
            "{GEMINI_API_BASE}/models/{}:generateContent",
            self.config.image_model
        );
        let response_json = self.post_json(&url, &payload_value).await?;

        let images = extract_inline_images(&response_json)?;
        let text = extract_text(&response_json);
        let model = response_json
            .pointer("/modelVersion")
            .and_then(Value::as_str)
            .unwrap_or(&self.config.image_model)
            .to_string();

        Ok(GeminiResponse {
            model,
            text,
            images,
            sanitized_payload,
        })
    }

    /// Kicks off a long-running video generation and polls it to completion.
    /// `progress` receives a human-readable status line per poll.
    pub async fn generate_video(
        &self,
        request: GenerateVideoRequest,
        progress: &(dyn Fn(&str) + Send + Sync),
    ) -> AppResult<String> {
        let payload = serde_json::to_value(build_video_payload(&request))?;
        tracing::debug!(model = %self.config.video_model, "gemini video request");
        progress("Preparing video generation...");

        let url = format!(
            "{GEMINI_API_BASE}/models/{}:predictLongRunning",
            self.config.video_model
        );
        let operation = self.post_json(&url, &payload).await?;
        let operation_name = operation
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::msg("video operation response missing name"))?
            .to_string();

        for attempt in 1..=VIDEO_POLL_LIMIT {
            progress(&format!("Generating video... (check {attempt})"));
            tokio::time::sleep(VIDEO_POLL_INTERVAL).await;

            let status = self
                .get_json(&format!("{GEMINI_API_BASE}/{operation_name}"))
                .await?;
            if status.get("done").and_then(Value::as_bool) == Some(true) {
                if let Some(error) = status.get("error") {
                    return Err(AppError::msg(format!("video generation failed: {error}")));
                }
                return extract_video_uri(&status)
                    .ok_or_else(|| AppError::msg("video operation finished without a video"));
            }
        }

        Err(AppError::msg("video generation timed out"))
    }

    async fn post_json(&self, url: &str, payload: &Value) -> AppResult<Value> {
        let response = self
            .http_client
            .post(url)
            .header("x-goog-api-key", self.config.require_api_key()?)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn get_json(&self, url: &str) -> AppResult<Value> {
        let response = self
            .http_client
            .get(url)
            .header("x-goog-api-key", self.config.require_api_key()?)
            .send()
            .await?;

        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> AppResult<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(parse_gemini_http_error(status, &body));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentPayload {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
enum Part {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inlineData")]
    InlineData(InlineData),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    aspect_ratio: String,
}

fn build_image_payload(request: &GenerateImageRequest) -> GenerateContentPayload {
    let mut parts = Vec::new();
    if let Some(reference) = &request.reference_image {
        parts.push(Part::InlineData(InlineData {
            mime_type: reference.mime.clone(),
            data: STANDARD.encode(&reference.bytes),
        }));
    }
    parts.push(Part::Text(request.prompt.clone()));

    GenerateContentPayload {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE", "TEXT"],
            image_config: request
                .aspect_ratio
                .clone()
                .map(|aspect_ratio| ImageConfig { aspect_ratio }),
        },
    }
}

fn build_video_payload(request: &GenerateVideoRequest) -> Value {
    let mut instance = json!({ "prompt": request.prompt });
    if let Some(reference) = &request.reference_image {
        instance["image"] = json!({
            "bytesBase64Encoded": STANDARD.encode(&reference.bytes),
            "mimeType": reference.mime,
        });
    }

    let mut parameters = json!({});
    if let Some(aspect_ratio) = &request.aspect_ratio {
        parameters["aspectRatio"] = json!(aspect_ratio);
    }
    if let Some(resolution) = &request.resolution {
        parameters["resolution"] = json!(resolution);
    }

    json!({ "instances": [instance], "parameters": parameters })
}

fn parse_gemini_http_error(status: StatusCode, body: &str) -> AppError {
    let gemini_error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());

    AppError::msg(format!("Gemini request failed ({status}): {gemini_error}"))
}

fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")?
        .as_array()?;
    let merged = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    if merged.trim().is_empty() {
        None
    } else {
        Some(merged)
    }
}

fn extract_inline_images(response: &Value) -> AppResult<Vec<EncodedImage>> {
    let mut images = Vec::new();

    if let Some(parts) = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
    {
        for part in parts {
            let inline = match part.get("inlineData").or_else(|| part.get("inline_data")) {
                Some(inline) => inline,
                None => continue,
            };

            let mime = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            if let Some(data) = inline.get("data").and_then(Value::as_str) {
                images.push(EncodedImage::new(mime, STANDARD.decode(data)?));
            }
        }
    }

    Ok(images)
}

fn extract_video_uri(status: &Value) -> Option<String> {
    const CANDIDATE_POINTERS: [&str; 2] = [
        "/response/generateVideoResponse/generatedSamples/0/video/uri",
        "/response/generatedVideos/0/video/uri",
    ];

    CANDIDATE_POINTERS
        .iter()
        .find_map(|pointer| status.pointer(pointer))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn sanitize_payload(payload: Value) -> Value {
    fn walk(value: &mut Value) {
        match value {
            Value::Object(map) => {
                for (key, nested) in map.iter_mut() {
                    if (key == "data" || key == "bytesBase64Encoded") && nested.is_string() {
                        *nested = json!("[omitted image data]");
                        continue;
                    }
                    walk(nested);
                }
            }
            Value::Array(array) => {
                for value in array.iter_mut() {
                    walk(value);
                }
            }
            _ => {}
        }
    }

    let mut sanitized = payload;
    walk(&mut sanitized);
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_payload_places_reference_before_prompt() {
        let payload = build_image_payload(&GenerateImageRequest {
            prompt: "a robot".to_string(),
            reference_image: Some(EncodedImage::new("image/png", vec![1, 2, 3])),
            aspect_ratio: Some("9:16".to_string()),
        });
        let value = serde_json::to_value(&payload).unwrap();

        assert!(value.pointer("/contents/0/parts/0/inlineData").is_some());
        assert_eq!(
            value.pointer("/contents/0/parts/1/text").and_then(Value::as_str),
            Some("a robot")
        );
        assert_eq!(
            value
                .pointer("/generationConfig/imageConfig/aspectRatio")
                .and_then(Value::as_str),
            Some("9:16")
        );
    }

    #[test]
    fn image_config_omitted_without_aspect_ratio() {
        let payload = build_image_payload(&GenerateImageRequest {
            prompt: "a robot".to_string(),
            reference_image: None,
            aspect_ratio: None,
        });
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.pointer("/generationConfig/imageConfig").is_none());
    }

    #[test]
    fn extracts_inline_images_and_text() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "here you go" },
                        { "inlineData": { "mimeType": "image/png", "data": STANDARD.encode([9u8, 8, 7]) } }
                    ]
                }
            }]
        });

        let images = extract_inline_images(&response).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime, "image/png");
        assert_eq!(images[0].bytes, vec![9, 8, 7]);
        assert_eq!(extract_text(&response).as_deref(), Some("here you go"));
    }

    #[test]
    fn sanitizer_elides_image_bytes() {
        let sanitized = sanitize_payload(json!({
            "contents": [{ "parts": [{ "inlineData": { "mimeType": "image/png", "data": "QUJD" } }] }]
        }));
        assert_eq!(
            sanitized.pointer("/contents/0/parts/0/inlineData/data"),
            Some(&json!("[omitted image data]"))
        );
    }

    #[test]
    fn http_error_prefers_structured_message() {
        let error = parse_gemini_http_error(
            StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "API key not valid"}}"#,
        );
        assert_eq!(
            error.to_string(),
            "Gemini request failed (400 Bad Request): API key not valid"
        );
    }

    #[test]
    fn video_uri_extracted_from_either_shape() {
        let status = json!({
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "uri": "https://example.test/video.mp4" } }
            ]}}
        });
        assert_eq!(
            extract_video_uri(&status).as_deref(),
            Some("https://example.test/video.mp4")
        );
    }
}
