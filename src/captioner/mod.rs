//! Captioning backends.
//!
//! [`ImageCaptioner`] abstracts over whatever produces an [`ImageCaption`]
//! for a single image. The digest pipeline only ever sees the trait, so
//! backends can be swapped without touching the worker pool:
//!
//! * [`MockCaptioner`]: deterministic, offline, needs no credentials.
//! * [`openai::OpenAiCaptioner`]: calls a vision model via the OpenAI
//!   Responses API.

pub mod openai;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CaptionError;

/// What an image is doing in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionRole {
    Diagram,
    Screenshot,
    Chart,
    Photo,
    Whiteboard,
    #[default]
    Unknown,
}

impl CaptionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionRole::Diagram => "diagram",
            CaptionRole::Screenshot => "screenshot",
            CaptionRole::Chart => "chart",
            CaptionRole::Photo => "photo",
            CaptionRole::Whiteboard => "whiteboard",
            CaptionRole::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CaptionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured caption for one image.
///
/// Deserialization is lenient about ABSENT fields (each takes its default)
/// but strict about PRESENT ones: a wrong type, an unknown role, or an
/// out-of-range confidence fails the whole caption, and the pipeline treats
/// that like any other backend failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCaption {
    #[serde(default)]
    pub role: CaptionRole,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub need_open_image_when: Vec<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}

impl ImageCaption {
    /// Coerces backend JSON into a caption.
    pub fn from_json_value(
        asset_id: &str,
        value: serde_json::Value,
    ) -> Result<Self, CaptionError> {
        let caption: ImageCaption =
            serde_json::from_value(value).map_err(|err| CaptionError::InvalidShape {
                asset_id: asset_id.to_string(),
                detail: err.to_string(),
            })?;
        if !(0.0..=1.0).contains(&caption.confidence) {
            return Err(CaptionError::InvalidShape {
                asset_id: asset_id.to_string(),
                detail: format!("confidence {} out of range 0..=1", caption.confidence),
            });
        }
        Ok(caption)
    }
}

/// Inputs for one caption task.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    /// Local path of the downloaded image bytes.
    pub image_path: PathBuf,
    /// Markdown surrounding the placeholder, other digest fences stripped.
    pub nearby_context: String,
    /// Asset id the caption belongs to.
    pub asset_id: String,
}

/// Abstraction over caption producers.
///
/// `Send + Sync` so a single backend instance can serve every worker in the
/// digest pool concurrently.
#[async_trait]
pub trait ImageCaptioner: Send + Sync {
    /// Produces a caption for one image. Failures are per-task; the pipeline
    /// decides whether to fall back or abort the run.
    async fn caption(&self, request: &CaptionRequest) -> Result<ImageCaption, CaptionError>;
}

/// Deterministic offline captioner.
///
/// Builds a stable caption from the asset id and nearby context alone and
/// never reads the image bytes, so it also works for assets that were never
/// downloaded. It doubles as the fallback used when a real backend fails and
/// [`crate::config::DigestConfig::fallback_on_error`] is on, which makes its
/// output format part of the pipeline's contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCaptioner;

#[async_trait]
impl ImageCaptioner for MockCaptioner {
    async fn caption(&self, request: &CaptionRequest) -> Result<ImageCaption, CaptionError> {
        // Truncation counts characters, not bytes, so multibyte context
        // never splits a code point.
        let short: String = request.nearby_context.chars().take(160).collect();
        let short = short.split_whitespace().collect::<Vec<_>>().join(" ");
        let summary = if short.is_empty() {
            format!("Image {} extracted from document.", request.asset_id)
        } else {
            format!(
                "Image {} likely supports nearby content: {short}",
                request.asset_id
            )
        };
        Ok(ImageCaption {
            role: CaptionRole::Unknown,
            summary,
            key_points: vec![
                format!("asset_path={}", request.image_path.display()),
                "Replace with multimodal model output in production.".to_string(),
            ],
            need_open_image_when: vec![
                "Need exact values, tiny text, or visual layout details.".to_string(),
            ],
            confidence: 0.35,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(context: &str) -> CaptionRequest {
        CaptionRequest {
            image_path: PathBuf::from("assets/images/img_tok1.bin"),
            nearby_context: context.to_string(),
            asset_id: "img_tok1".to_string(),
        }
    }

    #[test]
    fn mock_summary_embeds_collapsed_context() {
        let caption = tokio_test::block_on(async {
            MockCaptioner
                .caption(&request("some   nearby\n\ntext"))
                .await
                .unwrap()
        });
        assert_eq!(
            caption.summary,
            "Image img_tok1 likely supports nearby content: some nearby text"
        );
        assert_eq!(caption.role, CaptionRole::Unknown);
        assert_eq!(caption.confidence, 0.35);
    }

    #[test]
    fn mock_summary_without_context() {
        let caption = tokio_test::block_on(async {
            MockCaptioner.caption(&request("   ")).await.unwrap()
        });
        assert_eq!(caption.summary, "Image img_tok1 extracted from document.");
    }

    #[test]
    fn mock_truncates_context_by_characters() {
        let long: String = "é".repeat(500);
        let caption = tokio_test::block_on(async {
            MockCaptioner.caption(&request(&long)).await.unwrap()
        });
        let embedded = caption
            .summary
            .rsplit_once(": ")
            .map(|(_, tail)| tail)
            .unwrap();
        assert_eq!(embedded.chars().count(), 160);
    }

    #[test]
    fn mock_key_points_name_the_asset_path() {
        let caption =
            tokio_test::block_on(async { MockCaptioner.caption(&request("")).await.unwrap() });
        assert_eq!(
            caption.key_points,
            vec![
                "asset_path=assets/images/img_tok1.bin".to_string(),
                "Replace with multimodal model output in production.".to_string(),
            ]
        );
        assert_eq!(
            caption.need_open_image_when,
            vec!["Need exact values, tiny text, or visual layout details.".to_string()]
        );
    }

    #[test]
    fn caption_defaults_apply_to_missing_fields() {
        let caption = ImageCaption::from_json_value("img1", json!({})).unwrap();
        assert_eq!(caption.role, CaptionRole::Unknown);
        assert_eq!(caption.summary, "");
        assert!(caption.key_points.is_empty());
        assert!(caption.need_open_image_when.is_empty());
        assert_eq!(caption.confidence, 0.5);
    }

    #[test]
    fn caption_rejects_unknown_role() {
        let err =
            ImageCaption::from_json_value("img1", json!({ "role": "meme" })).unwrap_err();
        assert!(err.to_string().contains("img1"), "got: {err}");
    }

    #[test]
    fn caption_rejects_out_of_range_confidence() {
        let err =
            ImageCaption::from_json_value("img1", json!({ "confidence": 1.5 })).unwrap_err();
        assert!(err.to_string().contains("out of range"), "got: {err}");
    }

    #[test]
    fn caption_rejects_mistyped_key_points() {
        assert!(ImageCaption::from_json_value("img1", json!({ "key_points": "no" })).is_err());
    }

    #[test]
    fn caption_keeps_present_fields() {
        let caption = ImageCaption::from_json_value(
            "img1",
            json!({
                "role": "chart",
                "summary": "Quarterly revenue",
                "key_points": ["Q3 up 12%"],
                "confidence": 0.9
            }),
        )
        .unwrap();
        assert_eq!(caption.role, CaptionRole::Chart);
        assert_eq!(caption.key_points, vec!["Q3 up 12%".to_string()]);
        assert_eq!(caption.confidence, 0.9);
    }
}
