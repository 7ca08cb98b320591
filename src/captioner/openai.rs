//! OpenAI captioning backend.
//!
//! Talks to the Responses API with a strict `json_schema` response format,
//! so the model either returns a caption-shaped JSON object or the request
//! fails outright. Images travel inline as base64 data URLs; nothing is
//! uploaded out of band.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::debug;

use crate::captioner::{CaptionRequest, ImageCaption, ImageCaptioner};
use crate::error::CaptionError;
use crate::prompts::{caption_response_format, caption_user_text, CAPTION_INSTRUCTION};

/// Model used when neither the config nor `OPENAI_MODEL` says otherwise.
pub const DEFAULT_MODEL: &str = "gpt-5.2";

/// Default API root. Override for proxies and compatible gateways.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Captioner backed by the OpenAI Responses API.
pub struct OpenAiCaptioner {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiCaptioner {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            // TODO: add a per-call timeout; a hung caption request currently
            // stalls its worker until the connection dies.
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Builds a captioner from `OPENAI_API_KEY`, honouring `OPENAI_MODEL`
    /// and `OPENAI_BASE_URL` when set. Returns None without a key.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())?;
        let mut captioner = Self::new(api_key);
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.is_empty() {
                captioner = captioner.with_model(model);
            }
        }
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            if !base_url.is_empty() {
                captioner = captioner.with_base_url(base_url);
            }
        }
        Some(captioner)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &CaptionRequest, data_url: &str) -> Value {
        json!({
            "model": self.model,
            "text": { "format": caption_response_format() },
            "input": [
                {
                    "role": "system",
                    "content": [
                        { "type": "input_text", "text": CAPTION_INSTRUCTION }
                    ]
                },
                {
                    "role": "user",
                    "content": [
                        {
                            "type": "input_text",
                            "text": caption_user_text(&request.asset_id, &request.nearby_context)
                        },
                        { "type": "input_image", "image_url": data_url }
                    ]
                }
            ]
        })
    }
}

impl fmt::Debug for OpenAiCaptioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCaptioner")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl ImageCaptioner for OpenAiCaptioner {
    async fn caption(&self, request: &CaptionRequest) -> Result<ImageCaption, CaptionError> {
        let bytes = tokio::fs::read(&request.image_path).await.map_err(|err| {
            CaptionError::ImageReadFailed {
                path: request.image_path.clone(),
                detail: err.to_string(),
            }
        })?;
        let mime = guess_mime(&request.image_path);
        let data_url = format!("data:{mime};base64,{}", STANDARD.encode(&bytes));
        debug!(
            "Encoded {} ({} bytes) as a {mime} data URL for asset {}",
            request.image_path.display(),
            bytes.len(),
            request.asset_id
        );

        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request, &data_url))
            .send()
            .await
            .map_err(|err| CaptionError::Http {
                detail: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CaptionError::Api {
                status: status.as_u16(),
                model: self.model.clone(),
                body: body.chars().take(500).collect(),
            });
        }

        let payload: Value = response.json().await.map_err(|err| CaptionError::Http {
            detail: err.to_string(),
        })?;
        parse_caption(&request.asset_id, &extract_output_text(&payload))
    }
}

/// Pulls the model's text out of a Responses API payload. Gateways that
/// aggregate an `output_text` field are honoured; otherwise the text parts
/// of the output messages are concatenated.
fn extract_output_text(payload: &Value) -> String {
    if let Some(Value::String(text)) = payload.get("output_text") {
        return text.trim().to_string();
    }
    let Some(items) = payload.get("output").and_then(Value::as_array) else {
        return String::new();
    };
    let mut pieces = Vec::new();
    for item in items {
        let Some(parts) = item.get("content").and_then(Value::as_array) else {
            continue;
        };
        for part in parts {
            if part.get("type").and_then(Value::as_str) == Some("output_text") {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    pieces.push(text);
                }
            }
        }
    }
    pieces.concat().trim().to_string()
}

/// Trims model output to its outermost JSON object and coerces it into an
/// [`ImageCaption`]. Models occasionally wrap the object in prose despite
/// the strict schema; everything outside the braces is discarded.
fn parse_caption(asset_id: &str, raw: &str) -> Result<ImageCaption, CaptionError> {
    let excerpt = || raw.chars().take(200).collect::<String>();
    let (start, end) = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => (start, end),
        _ => return Err(CaptionError::NonJsonOutput { excerpt: excerpt() }),
    };
    let value: Value = serde_json::from_str(&raw[start..=end])
        .map_err(|_| CaptionError::NonJsonOutput { excerpt: excerpt() })?;
    ImageCaption::from_json_value(asset_id, value)
}

/// Sniffs the mime type from the file extension. Unknown extensions fall
/// back to a generic binary type.
fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> CaptionRequest {
        CaptionRequest {
            image_path: PathBuf::from("assets/images/img_tok1.png"),
            nearby_context: "nearby".to_string(),
            asset_id: "img_tok1".to_string(),
        }
    }

    #[test]
    fn constructor_applies_defaults() {
        let captioner = OpenAiCaptioner::new("sk-test");
        assert_eq!(captioner.model(), DEFAULT_MODEL);
        assert_eq!(captioner.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let captioner = OpenAiCaptioner::new("sk-test").with_base_url("https://proxy.local/v1/");
        assert_eq!(captioner.base_url, "https://proxy.local/v1");
    }

    #[test]
    fn debug_redacts_the_api_key() {
        let rendered = format!("{:?}", OpenAiCaptioner::new("sk-secret"));
        assert!(!rendered.contains("sk-secret"), "got: {rendered}");
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn request_body_carries_instruction_schema_and_image() {
        let captioner = OpenAiCaptioner::new("sk-test").with_model("gpt-test");
        let body = captioner.request_body(&request(), "data:image/png;base64,AAAA");
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["text"]["format"]["json_schema"]["name"], "image_digest");
        assert_eq!(body["input"][0]["role"], "system");
        assert_eq!(body["input"][1]["role"], "user");
        assert_eq!(
            body["input"][1]["content"][1]["image_url"],
            "data:image/png;base64,AAAA"
        );
        let user_text = body["input"][1]["content"][0]["text"].as_str().unwrap();
        assert!(user_text.contains("Asset ID: img_tok1"));
        assert!(user_text.contains("nearby"));
    }

    #[test]
    fn parse_caption_strips_surrounding_prose() {
        let caption = parse_caption(
            "img1",
            "Sure! Here is the digest: {\"summary\": \"a chart\", \"confidence\": 0.8} hope it helps",
        )
        .unwrap();
        assert_eq!(caption.summary, "a chart");
        assert_eq!(caption.confidence, 0.8);
    }

    #[test]
    fn parse_caption_rejects_braceless_output() {
        let err = parse_caption("img1", "I cannot see any image").unwrap_err();
        assert!(matches!(err, CaptionError::NonJsonOutput { .. }));
    }

    #[test]
    fn parse_caption_rejects_reversed_braces() {
        assert!(parse_caption("img1", "} nothing {").is_err());
    }

    #[test]
    fn parse_caption_rejects_truncated_json() {
        let err = parse_caption("img1", "{\"summary\": \"cut off}").unwrap_err();
        assert!(matches!(err, CaptionError::NonJsonOutput { .. }));
    }

    #[test]
    fn output_text_is_collected_from_the_output_array() {
        let payload = json!({
            "output": [
                { "type": "reasoning", "summary": [] },
                {
                    "type": "message",
                    "content": [
                        { "type": "output_text", "text": "{\"summary\":" },
                        { "type": "output_text", "text": " \"x\"}" }
                    ]
                }
            ]
        });
        assert_eq!(extract_output_text(&payload), "{\"summary\": \"x\"}");
    }

    #[test]
    fn aggregated_output_text_field_wins_when_present() {
        let payload = json!({ "output_text": " {\"summary\": \"y\"} ", "output": [] });
        assert_eq!(extract_output_text(&payload), "{\"summary\": \"y\"}");
    }

    #[test]
    fn payload_without_output_yields_empty_text() {
        assert_eq!(extract_output_text(&json!({ "error": "rate limited" })), "");
    }

    #[test]
    fn mime_guessing_covers_common_image_types() {
        assert_eq!(guess_mime(Path::new("a.PNG")), "image/png");
        assert_eq!(guess_mime(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("a.webp")), "image/webp");
        assert_eq!(guess_mime(Path::new("a.gif")), "image/gif");
        assert_eq!(guess_mime(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(guess_mime(Path::new("noext")), "application/octet-stream");
    }
}
