//! Table preview clamping.
//!
//! Large tables make rendered Markdown unreadable and blow up LLM context
//! downstream, so the renderer only ever sees a preview: the header row plus
//! at most N data rows. The full table is preserved separately as CSV, and
//! the clamped block records how many rows were cut so the renderer can say
//! so in the output.
//!
//! Clamping works on a clone. The normalized document stays complete on
//! disk; only the rendering path sees the preview.

use tracing::debug;

use crate::docast::{DocBlock, Document};

/// Data rows kept per table when `TABLE_PREVIEW_MAX_ROWS` is unset.
pub const DEFAULT_TABLE_PREVIEW_MAX_ROWS: usize = 30;

/// Reads the preview row limit from `TABLE_PREVIEW_MAX_ROWS`, falling back
/// to [`DEFAULT_TABLE_PREVIEW_MAX_ROWS`] when unset or invalid.
pub fn table_preview_max_rows() -> usize {
    max_rows_from(std::env::var("TABLE_PREVIEW_MAX_ROWS").ok())
}

fn max_rows_from(raw: Option<String>) -> usize {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|&rows| rows >= 1)
        .unwrap_or(DEFAULT_TABLE_PREVIEW_MAX_ROWS)
}

/// Returns a copy of the document with every table clamped to its header
/// row plus at most `max_data_rows` data rows. Clamped tables carry
/// `truncated: true` and the omitted row count; tables at or under the
/// limit pass through untouched.
pub fn preview_document(document: &Document, max_data_rows: usize) -> Document {
    let mut preview = document.clone();
    for block in &mut preview.blocks {
        let DocBlock::Table {
            id,
            rows,
            truncated,
            omitted_rows,
        } = block
        else {
            continue;
        };
        let keep = max_data_rows.saturating_add(1);
        if rows.len() <= keep {
            continue;
        }
        let omitted = rows.len() - keep;
        rows.truncate(keep);
        *truncated = Some(true);
        *omitted_rows = Some(omitted);
        debug!("Table {id}: preview keeps {max_data_rows} data rows, omits {omitted}");
    }
    preview
}

/// Serializes full table rows as CSV. Every cell is quoted, with embedded
/// quotes doubled per RFC 4180. No trailing newline.
pub fn table_to_csv(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
