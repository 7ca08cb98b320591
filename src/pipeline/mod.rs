//! The document pipeline: normalize, preview, render, digest.
//!
//! ## Data flow
//!
//! ```text
//! Vec<RawBlock>                       (untrusted provider export)
//!       │
//!       ▼
//!   normalize ──▶ Document            (validated AST + asset registry)
//!       │
//!       ▼
//!    preview ──▶ Document             (table rows capped for Markdown)
//!       │
//!       ▼
//!     render ──▶ String               (deterministic Markdown with
//!       │                              image-digest placeholder fences)
//!       ▼
//!     digest ──▶ String               (placeholders replaced by captions)
//! ```
//!
//! Each stage is usable on its own:
//!
//! 1. [`normalize`]: raw block tree to [`crate::docast::Document`]. Never
//!    fails on malformed input, only on its own output.
//! 2. [`preview`]: row capping and CSV extraction for oversized tables.
//! 3. [`render`]: pure Document-to-Markdown rendering.
//! 4. [`digest`]: concurrent caption enrichment of placeholder fences.

pub mod digest;
pub mod normalize;
pub mod preview;
pub mod render;
