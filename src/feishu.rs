//! Raw Feishu docx block types as the provider API ships them.
//!
//! Everything here is UNTRUSTED input: fields may be missing, children may
//! reference ids that do not exist, and child chains may form cycles. The
//! types therefore make every field optional or defaulted, and carry no
//! behaviour. Interpretation lives in [`crate::pipeline::normalize`].
//!
//! Only the subset of the docx API that the normalizer reads is modelled.
//! serde ignores any extra fields the provider adds.

use serde::{Deserialize, Serialize};

/// Numeric `block_type` codes observed in the Feishu docx API.
pub mod block_type {
    pub const PAGE: i64 = 1;
    pub const TEXT: i64 = 2;
    pub const HEADING1: i64 = 3;
    pub const HEADING2: i64 = 4;
    pub const HEADING3: i64 = 5;
    pub const HEADING4: i64 = 6;
    pub const HEADING5: i64 = 7;
    pub const HEADING6: i64 = 8;
    pub const HEADING7: i64 = 9;
    pub const HEADING8: i64 = 10;
    pub const HEADING9: i64 = 11;
    pub const BULLET: i64 = 12;
    pub const ORDERED: i64 = 13;
    pub const CODE: i64 = 14;
    pub const QUOTE: i64 = 15;
    pub const TODO: i64 = 17;
    pub const CALLOUT: i64 = 19;
    pub const DIVIDER: i64 = 22;
    pub const IMAGE: i64 = 27;
    pub const TABLE: i64 = 31;
    pub const TABLE_CELL: i64 = 32;
}

/// One raw block of a Feishu document.
///
/// The flat list of these, as returned by the docx `blocks` endpoint, is the
/// normalizer's input. Parent/child structure is encoded by id references in
/// [`RawBlock::children`], not by nesting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    #[serde(default)]
    pub block_id: String,
    #[serde(default)]
    pub parent_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default)]
    pub block_type: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading1: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading2: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading3: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading4: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading5: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading6: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading7: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading8: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading9: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bullet: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordered: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callout: Option<TextContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo: Option<TodoContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_cell: Option<TextContainer>,
}

/// Element list shared by text-like containers (paragraphs, headings, list
/// items, quotes, callouts, table cells).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextContainer {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<TextElement>,
}

/// Code block payload. `language` is a numeric enum on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<TextElement>,
}

/// Todo block payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<TodoStyle>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<TextElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

/// Image block payload. Newer exports use `token`, older ones `file_token`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// Table block payload. `cells` is a grid of table-cell block ids; some
/// exports omit it and rely on row blocks under `children` instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableContainer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<Vec<String>>>,
}

/// One inline element. Exactly one of the payload fields is normally set,
/// but nothing guarantees that.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_run: Option<TextRunElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_element_style: Option<TextElementStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equation: Option<EquationElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<ReminderElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_link: Option<DocsLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<PersonElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextRunElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextElementStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_code: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EquationElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReminderElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mention: Option<MentionElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MentionElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocsLink {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
