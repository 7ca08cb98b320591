//! Prompt templates and the response schema for the captioning backend.
//!
//! Centralising the wording here serves two purposes:
//!
//! 1. The HTTP plumbing in [`crate::captioner::openai`] stays free of
//!    prompt-engineering decisions.
//! 2. Tests have one place to assert that requests carry the intended
//!    instruction and schema.

use serde_json::{json, Value};

/// System instruction sent with every caption request.
pub const CAPTION_INSTRUCTION: &str = "You are extracting a compact digest for an image in a technical document. Return only JSON with keys: role, summary, key_points, need_open_image_when, confidence. Keep summary <= 30 words; key_points 2-5 concise items; confidence 0..1.";

/// User message pairing the asset id with its surrounding Markdown context.
pub fn caption_user_text(asset_id: &str, nearby_context: &str) -> String {
    let context = if nearby_context.is_empty() {
        "(empty)"
    } else {
        nearby_context
    };
    format!("Asset ID: {asset_id}\nNearby markdown context:\n{context}")
}

/// Response format object for the OpenAI Responses API. `strict` forces the
/// model to emit exactly this shape or fail the request.
pub fn caption_response_format() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "image_digest",
            "schema": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "role": {
                        "type": "string",
                        "enum": ["diagram", "screenshot", "chart", "photo", "whiteboard", "unknown"]
                    },
                    "summary": { "type": "string" },
                    "key_points": { "type": "array", "items": { "type": "string" } },
                    "need_open_image_when": { "type": "array", "items": { "type": "string" } },
                    "confidence": { "type": "number", "minimum": 0, "maximum": 1 }
                },
                "required": ["role", "summary", "key_points", "need_open_image_when", "confidence"]
            },
            "strict": true
        }
    })
}
