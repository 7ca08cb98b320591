//! Error types for the feishu2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Feishu2MdError`]: **fatal**. The run cannot proceed at all (unreadable
//!   input file, document JSON that fails schema validation, captioning
//!   aborted with fallback disabled). Returned as `Err(Feishu2MdError)` from
//!   the top-level pipeline functions.
//!
//! * [`CaptionError`]: **per-task**. A single image caption failed (image
//!   bytes missing, HTTP failure, backend returned garbage) while every other
//!   caption task is fine. The digest pipeline catches these per task and
//!   either substitutes a fallback caption or aborts the whole run, depending
//!   on [`crate::config::DigestConfig::fallback_on_error`].
//!
//! The separation lets callers decide their own tolerance: ship a document
//! with a few fallback captions, or abort and leave the Markdown untouched.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the feishu2md library.
///
/// Per-image caption failures use [`CaptionError`] and are handled inside the
/// digest pipeline rather than propagated here, unless fallback is disabled.
#[derive(Debug, Error)]
pub enum Feishu2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Could not read an input file (document JSON or Markdown).
    #[error("Failed to read input file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document JSON could not be parsed into the expected shape.
    #[error("Failed to parse document JSON: {detail}")]
    DocumentParseFailed { detail: String },

    // ── Schema errors ─────────────────────────────────────────────────────
    /// A document violates its own invariants (heading level out of range,
    /// asset map key not matching the asset id).
    #[error("Document schema violation: {detail}")]
    SchemaViolation { detail: String },

    // ── Caption errors ────────────────────────────────────────────────────
    /// A caption task failed while fallback was disabled. The run stops and
    /// no output is written.
    #[error("Captioning aborted on asset '{asset_id}': {source}")]
    CaptionAborted {
        asset_id: String,
        #[source]
        source: CaptionError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Feishu2MdError>;

/// A recoverable error for a single caption task.
///
/// Produced by [`crate::captioner::ImageCaptioner`] implementations. The
/// digest pipeline decides per task whether to substitute a fallback caption
/// or abort the run.
#[derive(Debug, Clone, Error)]
pub enum CaptionError {
    /// Image bytes could not be read from the assets directory.
    #[error("Failed to read image '{path}': {detail}")]
    ImageReadFailed { path: PathBuf, detail: String },

    /// Transport-level HTTP failure (connect, TLS, broken stream).
    #[error("Caption request failed: {detail}")]
    Http { detail: String },

    /// The captioning API answered with a non-success status.
    #[error("openai caption failed: http={status} model={model} body={body}")]
    Api {
        status: u16,
        model: String,
        body: String,
    },

    /// The backend produced output that contains no JSON object.
    #[error("openai caption parse failed: non-json output ({excerpt})")]
    NonJsonOutput { excerpt: String },

    /// The backend returned JSON that does not satisfy the caption schema.
    #[error("Caption for asset '{asset_id}' failed schema validation: {detail}")]
    InvalidShape { asset_id: String, detail: String },
}
