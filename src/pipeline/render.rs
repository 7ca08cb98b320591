//! Document AST to Markdown.
//!
//! Rendering is pure and deterministic: the same document yields the same
//! bytes, with no clock, filesystem, or randomness involved. Every block
//! variant renders to SOMETHING, including unknown ones, which survive as an
//! HTML comment naming their raw type code.
//!
//! Image blocks render as an image reference plus an `image-digest`
//! placeholder fence. The digest pipeline later locates that fence by asset
//! id and replaces it in place, so its first two lines are a stable contract:
//!
//! ```text
//! ```image-digest
//! id: <asset_id>
//! ...
//! ```

use crate::docast::{DocBlock, Document, ListNode, TextRun};

/// Renders a document to Markdown: an escaped title heading, then every
/// block separated by blank lines, ending in exactly one newline.
pub fn render_markdown(document: &Document) -> String {
    let mut lines: Vec<String> = vec![
        format!("# {}", escape_pipes(&document.title)),
        String::new(),
    ];
    for block in &document.blocks {
        lines.extend(render_block(document, block));
        lines.push(String::new());
    }
    let joined = lines.join("\n");
    format!("{}\n", joined.trim_end())
}

fn render_block(document: &Document, block: &DocBlock) -> Vec<String> {
    match block {
        DocBlock::Paragraph { text_runs, .. } => vec![render_text_runs(text_runs)],
        DocBlock::Heading {
            level, text_runs, ..
        } => vec![format!(
            "{} {}",
            "#".repeat(usize::from(*level)),
            render_text_runs(text_runs)
        )],
        DocBlock::List { items, .. } => render_list_items(items, 0),
        DocBlock::Code {
            language,
            text_runs,
            ..
        } => vec![
            format!("```{}", language.as_deref().unwrap_or("")),
            render_text_runs(text_runs),
            "```".to_string(),
        ],
        DocBlock::Quote { text_runs, .. } => {
            vec![format!("> {}", render_text_runs(text_runs))]
        }
        DocBlock::Todo {
            checked, text_runs, ..
        } => {
            let marker = if *checked { "x" } else { " " };
            vec![format!("- [{marker}] {}", render_text_runs(text_runs))]
        }
        DocBlock::Callout { text_runs, .. } => vec![
            "> [!NOTE]".to_string(),
            format!("> {}", render_text_runs(text_runs)),
        ],
        DocBlock::Divider { .. } => vec!["---".to_string()],
        DocBlock::Image {
            asset_id,
            caption_runs,
            ..
        } => render_image(document, asset_id, caption_runs),
        DocBlock::Table {
            rows,
            truncated,
            omitted_rows,
            ..
        } => {
            let mut lines = render_table(rows);
            if truncated.unwrap_or(false) {
                let omitted = omitted_rows.unwrap_or(0);
                let omitted_clause = if omitted > 0 {
                    format!(", omitted {omitted} rows")
                } else {
                    String::new()
                };
                lines.push(String::new());
                lines.push(format!(
                    "> Table preview truncated{omitted_clause}. See CSV in assets/tables."
                ));
            }
            lines
        }
        DocBlock::Unknown { raw_type, .. } => {
            vec![format!("<!-- unsupported block type: {raw_type} -->")]
        }
    }
}

/// Inline runs joined into one line. Marks nest in a fixed order (code
/// innermost, then bold, italic, strike, link outermost) so output never
/// depends on map iteration or input quirks.
fn render_text_runs(runs: &[TextRun]) -> String {
    runs.iter()
        .map(|run| {
            let mut text = run.text.clone();
            let Some(marks) = &run.marks else {
                return text;
            };
            if marks.code.unwrap_or(false) {
                text = format!("`{text}`");
            }
            if marks.bold.unwrap_or(false) {
                text = format!("**{text}**");
            }
            if marks.italic.unwrap_or(false) {
                text = format!("*{text}*");
            }
            if marks.strike.unwrap_or(false) {
                text = format!("~~{text}~~");
            }
            if let Some(link) = marks.link.as_deref().filter(|link| !link.is_empty()) {
                text = format!("[{text}]({link})");
            }
            text
        })
        .collect()
}

fn render_list_items(items: &[ListNode], depth: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for item in items {
        let prefix = if item.ordered { "1." } else { "-" };
        let indent = "  ".repeat(depth);
        lines.push(format!(
            "{indent}{prefix} {}",
            render_text_runs(&item.text_runs)
        ));
        if !item.children.is_empty() {
            lines.extend(render_list_items(&item.children, depth + 1));
        }
    }
    lines
}

fn render_table(rows: &[Vec<String>]) -> Vec<String> {
    if rows.is_empty() {
        return vec!["| (empty table) |".to_string(), "| --- |".to_string()];
    }
    let escape_row = |row: &[String]| -> String {
        let cells: Vec<String> = row.iter().map(|cell| escape_pipes(cell)).collect();
        format!("| {} |", cells.join(" | "))
    };
    let header = &rows[0];
    let separator: Vec<&str> = header.iter().map(|_| "---").collect();
    let mut lines = vec![
        escape_row(header),
        format!("| {} |", separator.join(" | ")),
    ];
    for row in &rows[1..] {
        lines.push(escape_row(row));
    }
    lines
}

fn render_image(document: &Document, asset_id: &str, caption_runs: &[TextRun]) -> Vec<String> {
    let alt = {
        let rendered = render_text_runs(caption_runs);
        let trimmed = rendered.trim();
        if trimmed.is_empty() {
            format!("image-{asset_id}")
        } else {
            trimmed.to_string()
        }
    };
    let path = document
        .assets
        .get(asset_id)
        .map(|asset| asset.filename.clone())
        .unwrap_or_else(|| format!("assets/images/{asset_id}.bin"));
    vec![
        format!("![{alt}]({path})"),
        String::new(),
        "```image-digest".to_string(),
        format!("id: {asset_id}"),
        "role: unknown".to_string(),
        "summary: \"TODO: fill image summary\"".to_string(),
        "key_points:".to_string(),
        "  - \"\"".to_string(),
        "need_open_image_when:".to_string(),
        "  - \"\"".to_string(),
        "confidence: 0.0".to_string(),
        "```".to_string(),
    ]
}

fn escape_pipes(text: &str) -> String {
    text.replace('|', "\\|")
}
