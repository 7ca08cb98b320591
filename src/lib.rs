//! # feishu2md
//!
//! Convert Feishu (Lark) document block trees to Markdown with VLM-captioned
//! images.
//!
//! ## Why this crate?
//!
//! The Feishu document API returns a flat list of raw blocks: parent/child
//! links by id, dozens of numeric block types, text scattered across
//! per-type containers, and no guarantees about what a buggy or hostile
//! export contains (dangling ids, cycles, unbounded nesting). This crate
//! normalizes that into a small validated document AST, renders it as
//! deterministic Markdown, and enriches every embedded image with a compact
//! structured digest so text-only LLM pipelines can reason about figures
//! without opening them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Feishu block JSON
//!  │
//!  ├─ 1. Normalize  untrusted raw blocks → validated AST + asset registry
//!  ├─ 2. Preview    clamp large tables, keeping full rows for CSV export
//!  ├─ 3. Render     deterministic Markdown with image-digest placeholders
//!  └─ 4. Digest     concurrent VLM captions spliced over the placeholders
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use feishu2md::{
//!     digest_markdown, normalize, preview_document, render_markdown,
//!     table_preview_max_rows, DigestConfig, RawBlock,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let raw: Vec<RawBlock> =
//!         serde_json::from_str(&std::fs::read_to_string("blocks.json")?)?;
//!     let document = normalize(
//!         &raw,
//!         "doccnExample",
//!         "Design notes",
//!         "https://example.feishu.cn/docx/doccnExample",
//!     )?;
//!     let preview = preview_document(&document, table_preview_max_rows());
//!     let markdown = render_markdown(&preview);
//!     // Captioner auto-detected from OPENAI_API_KEY; offline mock otherwise
//!     let enriched = digest_markdown(
//!         &document,
//!         &markdown,
//!         "assets/images",
//!         &DigestConfig::default(),
//!     )
//!     .await?;
//!     println!("{enriched}");
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `OPENAI_API_KEY` | Enables the OpenAI captioning backend |
//! | `OPENAI_MODEL` | Overrides the caption model (default `gpt-5.2`) |
//! | `OPENAI_BASE_URL` | Points the backend at an OpenAI-compatible API |
//! | `DIGEST_CONCURRENCY` | Caption worker count (default 3) |
//! | `TABLE_PREVIEW_MAX_ROWS` | Data rows kept per table preview (default 30) |
//!
//! All of these are defaults only; explicit [`DigestConfig`] settings win.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod captioner;
pub mod config;
pub mod docast;
pub mod error;
pub mod feishu;
pub mod pipeline;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use captioner::openai::OpenAiCaptioner;
pub use captioner::{CaptionRequest, CaptionRole, ImageCaption, ImageCaptioner, MockCaptioner};
pub use config::{DigestConfig, DigestConfigBuilder};
pub use docast::{
    Asset, AssetKind, DocBlock, Document, ListNode, Marks, Source, SourceKind, TextRun,
};
pub use error::{CaptionError, Feishu2MdError, Result};
pub use feishu::RawBlock;
pub use pipeline::digest::{digest_file, digest_markdown};
pub use pipeline::normalize::normalize;
pub use pipeline::preview::{preview_document, table_preview_max_rows, table_to_csv};
pub use pipeline::render::render_markdown;
