//! The document AST shared by the normalizer, renderer, and digest pipeline.
//!
//! A [`Document`] is the validated, stable intermediate form between the raw
//! Feishu block tree and the rendered Markdown. On disk it is wrapped in a
//! single `doc` key so the format can grow siblings later without breaking
//! old readers:
//!
//! ```text
//! {
//!   "doc": {
//!     "doc_id": "...",
//!     "title": "...",
//!     "source": { "type": "feishu_doc", "url": "..." },
//!     "blocks": [ { "type": "paragraph", ... }, ... ],
//!     "assets": { "<asset_id>": { ... }, ... }
//!   }
//! }
//! ```
//!
//! Parsing is strict: a missing field or a mistyped value fails the whole
//! load, while unknown extra fields are ignored. Range rules that the type
//! system cannot express (heading levels, asset map keys) are enforced by
//! [`Document::validate`], which runs on every load and save.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Feishu2MdError, Result};

/// A span of inline text plus optional styling marks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<Marks>,
}

impl TextRun {
    /// A run with no marks. The normalizer uses this for plain content.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            marks: None,
        }
    }
}

/// Inline styling flags. Every field is optional so that absent and `false`
/// serialize identically to the upstream export format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Marks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strike: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// One item of a (possibly nested) list.
///
/// `ordered` is per item: a child may switch numbering style relative to its
/// parent, which the renderer honours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListNode {
    pub id: String,
    pub ordered: bool,
    pub text_runs: Vec<TextRun>,
    #[serde(default)]
    pub children: Vec<ListNode>,
}

/// A single block of the document, tagged by `type` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocBlock {
    Paragraph {
        id: String,
        text_runs: Vec<TextRun>,
    },
    Heading {
        id: String,
        level: u8,
        text_runs: Vec<TextRun>,
    },
    List {
        id: String,
        ordered: bool,
        items: Vec<ListNode>,
    },
    Code {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        text_runs: Vec<TextRun>,
    },
    Quote {
        id: String,
        text_runs: Vec<TextRun>,
    },
    Todo {
        id: String,
        checked: bool,
        text_runs: Vec<TextRun>,
    },
    Callout {
        id: String,
        text_runs: Vec<TextRun>,
    },
    Divider {
        id: String,
    },
    Image {
        id: String,
        asset_id: String,
        #[serde(default)]
        caption_runs: Vec<TextRun>,
    },
    Table {
        id: String,
        rows: Vec<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        truncated: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        omitted_rows: Option<usize>,
    },
    Unknown {
        id: String,
        raw_type: i64,
    },
}

impl DocBlock {
    /// Block id, uniform across all variants.
    pub fn id(&self) -> &str {
        match self {
            DocBlock::Paragraph { id, .. }
            | DocBlock::Heading { id, .. }
            | DocBlock::List { id, .. }
            | DocBlock::Code { id, .. }
            | DocBlock::Quote { id, .. }
            | DocBlock::Todo { id, .. }
            | DocBlock::Callout { id, .. }
            | DocBlock::Divider { id }
            | DocBlock::Image { id, .. }
            | DocBlock::Table { id, .. }
            | DocBlock::Unknown { id, .. } => id,
        }
    }
}

/// Kind of a registered asset. Only images exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
}

/// A binary asset referenced by the document, keyed by provider token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub kind: AssetKind,
    pub token: String,
    /// Relative path the downloader is expected to materialise, e.g.
    /// `assets/images/<token>.bin`.
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    pub source_block_id: String,
}

/// Provenance kind of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "feishu_doc")]
    FeishuDoc,
}

/// Where the document came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: String,
}

impl Source {
    pub fn feishu_doc(url: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::FeishuDoc,
            url: url.into(),
        }
    }
}

/// The validated document AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: String,
    pub source: Source,
    pub blocks: Vec<DocBlock>,
    /// Assets keyed by asset id. Key order carries no meaning.
    pub assets: BTreeMap<String, Asset>,
}

/// On-disk wrapper. Kept private so the `doc` envelope stays an
/// implementation detail of [`Document::from_json_str`] and friends.
#[derive(Serialize, Deserialize)]
struct PersistedDocument {
    doc: Document,
}

impl Document {
    /// Checks the invariants that the serde schema cannot express.
    ///
    /// Returns [`Feishu2MdError::SchemaViolation`] naming the offending
    /// block or asset.
    pub fn validate(&self) -> Result<()> {
        for block in &self.blocks {
            if let DocBlock::Heading { id, level, .. } = block {
                if !(1..=6).contains(level) {
                    return Err(Feishu2MdError::SchemaViolation {
                        detail: format!("heading '{id}' has level {level}, expected 1..=6"),
                    });
                }
            }
        }
        for (key, asset) in &self.assets {
            if key != &asset.id {
                return Err(Feishu2MdError::SchemaViolation {
                    detail: format!(
                        "asset map key '{key}' does not match asset id '{}'",
                        asset.id
                    ),
                });
            }
        }
        Ok(())
    }

    /// Parses a persisted document and validates it.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let persisted: PersistedDocument =
            serde_json::from_str(raw).map_err(|err| Feishu2MdError::DocumentParseFailed {
                detail: err.to_string(),
            })?;
        persisted.doc.validate()?;
        Ok(persisted.doc)
    }

    /// Serializes to the persisted wrapper as pretty-printed JSON with a
    /// trailing newline, validating first.
    pub fn to_json_string(&self) -> Result<String> {
        self.validate()?;
        let persisted = PersistedDocument { doc: self.clone() };
        let json = serde_json::to_string_pretty(&persisted)
            .map_err(|err| Feishu2MdError::Internal(format!("document serialization: {err}")))?;
        Ok(format!("{json}\n"))
    }

    /// Loads and validates a persisted document from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|source| {
            Feishu2MdError::InputReadFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        match Self::from_json_str(&raw) {
            Ok(doc) => Ok(doc),
            Err(Feishu2MdError::DocumentParseFailed { detail }) => {
                Err(Feishu2MdError::DocumentParseFailed {
                    detail: format!("{}: {detail}", path.display()),
                })
            }
            Err(other) => Err(other),
        }
    }

    /// Writes the persisted document atomically: serialize to a `.tmp`
    /// sibling, then rename over the target.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json_string()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| {
                    Feishu2MdError::OutputWriteFailed {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
            }
        }
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await.map_err(|source| {
            Feishu2MdError::OutputWriteFailed {
                path: tmp_path.clone(),
                source,
            }
        })?;
        tokio::fs::rename(&tmp_path, path).await.map_err(|source| {
            Feishu2MdError::OutputWriteFailed {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Ok(())
    }
}
