//! Full-pipeline integration tests: raw Feishu blocks through normalization,
//! table preview, and Markdown rendering.
//!
//! Everything here is hermetic. Fixtures are built in code; no network, no
//! environment variables, no files.

use feishu2md::feishu::{
    block_type, CodeContainer, DocsLink, ImageContainer, RawBlock, TableContainer, TextContainer,
    TextElement, TextElementStyle, TextRunElement, TodoContainer, TodoStyle,
};
use feishu2md::{normalize, preview_document, render_markdown, table_to_csv, DocBlock, Document};

// ── Fixture helpers ──────────────────────────────────────────────────────

fn text_element(content: &str) -> TextElement {
    TextElement {
        text_run: Some(TextRunElement {
            content: Some(content.to_string()),
        }),
        ..TextElement::default()
    }
}

fn container(contents: &[&str]) -> TextContainer {
    TextContainer {
        elements: contents.iter().map(|content| text_element(content)).collect(),
    }
}

fn page(children: &[&str]) -> RawBlock {
    RawBlock {
        block_id: "page".to_string(),
        block_type: block_type::PAGE,
        children: children.iter().map(|child| (*child).to_string()).collect(),
        ..RawBlock::default()
    }
}

/// A block parented to the page root.
fn child(id: &str, kind: i64) -> RawBlock {
    RawBlock {
        block_id: id.to_string(),
        parent_id: "page".to_string(),
        block_type: kind,
        ..RawBlock::default()
    }
}

fn paragraph(id: &str, content: &str) -> RawBlock {
    RawBlock {
        text: Some(container(&[content])),
        ..child(id, block_type::TEXT)
    }
}

fn heading(id: &str, kind: i64, content: &str) -> RawBlock {
    let mut block = child(id, kind);
    let filled = Some(container(&[content]));
    match kind {
        block_type::HEADING1 => block.heading1 = filled,
        block_type::HEADING2 => block.heading2 = filled,
        block_type::HEADING3 => block.heading3 = filled,
        block_type::HEADING4 => block.heading4 = filled,
        block_type::HEADING5 => block.heading5 = filled,
        block_type::HEADING6 => block.heading6 = filled,
        block_type::HEADING7 => block.heading7 = filled,
        block_type::HEADING8 => block.heading8 = filled,
        _ => block.heading9 = filled,
    }
    block
}

fn bullet(id: &str, parent: &str, content: &str, children: &[&str]) -> RawBlock {
    RawBlock {
        parent_id: parent.to_string(),
        children: children.iter().map(|child| (*child).to_string()).collect(),
        bullet: Some(container(&[content])),
        ..child(id, block_type::BULLET)
    }
}

fn image(id: &str, token: &str, alt: Option<&str>) -> RawBlock {
    RawBlock {
        image: Some(ImageContainer {
            token: Some(token.to_string()),
            file_token: None,
            alt: alt.map(str::to_string),
        }),
        ..child(id, block_type::IMAGE)
    }
}

/// A table with a `cells` grid plus one table-cell block per entry, one
/// column wide, `data_rows` rows under a header.
fn single_column_table(id: &str, data_rows: usize) -> Vec<RawBlock> {
    let mut blocks = Vec::new();
    let mut grid = Vec::new();
    for row in 0..=data_rows {
        let cell_id = format!("{id}-c{row}");
        let content = if row == 0 {
            "header".to_string()
        } else {
            format!("row {row}")
        };
        blocks.push(RawBlock {
            table_cell: Some(container(&[&content])),
            ..child(&cell_id, block_type::TABLE_CELL)
        });
        grid.push(vec![cell_id]);
    }
    blocks.push(RawBlock {
        table: Some(TableContainer { cells: Some(grid) }),
        ..child(id, block_type::TABLE)
    });
    blocks
}

fn normalize_page(blocks: &[RawBlock], title: &str) -> Document {
    normalize(
        blocks,
        "doc1",
        title,
        "https://example.feishu.cn/docx/doc1",
    )
    .expect("normalize should succeed")
}

/// Assert each needle occurs, in the given order.
fn assert_in_order(markdown: &str, needles: &[&str]) {
    let mut from = 0;
    for needle in needles {
        match markdown[from..].find(needle) {
            Some(at) => from += at + needle.len(),
            None => panic!("expected {needle:?} after byte {from} in:\n{markdown}"),
        }
    }
}

fn kitchen_sink_blocks() -> Vec<RawBlock> {
    let mut blocks = vec![
        page(&[
            "h1", "p1", "l1", "l2", "code1", "quote1", "todo1", "todo2", "callout1", "div1",
            "img1", "tbl1", "mystery", "ghost",
        ]),
        heading("h1", block_type::HEADING1, "Overview"),
        RawBlock {
            text: Some(TextContainer {
                elements: vec![
                    TextElement {
                        text_element_style: Some(TextElementStyle {
                            bold: Some(true),
                            ..TextElementStyle::default()
                        }),
                        ..text_element("Feishu")
                    },
                    text_element(" exports, see "),
                    TextElement {
                        docs_link: Some(DocsLink {
                            url: Some("https://example.com".to_string()),
                        }),
                        ..text_element("docs")
                    },
                ],
            }),
            ..child("p1", block_type::TEXT)
        },
        bullet("l1", "page", "item one", &["l2"]),
        bullet("l2", "l1", "nested", &[]),
        RawBlock {
            code: Some(CodeContainer {
                language: Some(49),
                elements: vec![text_element("fn main() {}")],
            }),
            ..child("code1", block_type::CODE)
        },
        RawBlock {
            quote: Some(container(&["Shipped last week"])),
            ..child("quote1", block_type::QUOTE)
        },
        RawBlock {
            todo: Some(TodoContainer {
                style: Some(TodoStyle { done: Some(false) }),
                elements: vec![text_element("Write docs")],
            }),
            ..child("todo1", block_type::TODO)
        },
        RawBlock {
            todo: Some(TodoContainer {
                style: Some(TodoStyle { done: Some(true) }),
                elements: vec![text_element("Ship it")],
            }),
            ..child("todo2", block_type::TODO)
        },
        RawBlock {
            callout: Some(container(&["Heads up"])),
            ..child("callout1", block_type::CALLOUT)
        },
        child("div1", block_type::DIVIDER),
        image("img1", "imgtok_1", Some("Latency chart")),
        child("mystery", 99),
    ];
    blocks.extend(single_column_table("tbl1", 2));
    blocks
}

// ── Full pipeline rendering ──────────────────────────────────────────────

#[test]
fn kitchen_sink_document_renders_every_block_kind() {
    let document = normalize_page(&kitchen_sink_blocks(), "Release Notes");
    let markdown = render_markdown(&document);

    assert_in_order(
        &markdown,
        &[
            "# Release Notes",
            "# Overview",
            "**Feishu** exports, see [docs](https://example.com)",
            "- item one\n  - nested",
            "```49\nfn main() {}\n```",
            "> Shipped last week",
            "- [ ] Write docs",
            "- [x] Ship it",
            "> [!NOTE]\n> Heads up",
            "---",
            "![Latency chart](assets/images/imgtok_1.bin)",
            "```image-digest\nid: imgtok_1\n",
            "| header |",
            "| --- |",
            "| row 1 |",
            "| row 2 |",
            "<!-- unsupported block type: 99 -->",
        ],
    );
    assert!(markdown.ends_with('\n'));
    assert!(!markdown.contains("\n\n\n"));
}

#[test]
fn nested_list_blocks_are_not_emitted_twice_at_top_level() {
    let document = normalize_page(&kitchen_sink_blocks(), "Release Notes");
    let markdown = render_markdown(&document);
    assert_eq!(
        markdown.matches("nested").count(),
        1,
        "the nested item must render only inside its parent list:\n{markdown}"
    );
}

#[test]
fn images_register_assets_keyed_by_token() {
    let document = normalize_page(&kitchen_sink_blocks(), "Release Notes");
    let asset = document
        .assets
        .get("imgtok_1")
        .expect("the image token should be registered");
    assert_eq!(asset.filename, "assets/images/imgtok_1.bin");
    assert_eq!(asset.source_block_id, "img1");
}

#[test]
fn provider_heading_levels_collapse_to_six() {
    let blocks = vec![
        page(&["h2", "h9"]),
        heading("h2", block_type::HEADING2, "Section"),
        heading("h9", block_type::HEADING9, "Deep section"),
    ];
    let markdown = render_markdown(&normalize_page(&blocks, "T"));
    assert!(markdown.contains("\n## Section\n"), "got:\n{markdown}");
    assert!(
        markdown.contains("\n###### Deep section\n"),
        "got:\n{markdown}"
    );
}

// ── Determinism ──────────────────────────────────────────────────────────

#[test]
fn rendering_is_deterministic_and_survives_persistence() {
    let first = render_markdown(&normalize_page(&kitchen_sink_blocks(), "Release Notes"));
    let second = render_markdown(&normalize_page(&kitchen_sink_blocks(), "Release Notes"));
    assert_eq!(first, second, "two normalize+render runs must match");

    let document = normalize_page(&kitchen_sink_blocks(), "Release Notes");
    let json = document.to_json_string().expect("document should serialize");
    let reloaded = Document::from_json_str(&json).expect("document should parse");
    assert_eq!(
        render_markdown(&reloaded),
        first,
        "rendering after a JSON round-trip must match"
    );
}

// ── Table preview and CSV export ─────────────────────────────────────────

#[test]
fn oversized_tables_are_clamped_only_in_the_preview() {
    let mut blocks = vec![page(&["big"])];
    blocks.extend(single_column_table("big", 35));
    let document = normalize_page(&blocks, "T");

    let full = render_markdown(&document);
    assert!(!full.contains("Table preview truncated"), "got:\n{full}");
    assert!(full.contains("| row 35 |"));

    let preview = render_markdown(&preview_document(&document, 30));
    assert!(preview.contains("| row 30 |"));
    assert!(!preview.contains("| row 31 |"));
    assert!(
        preview.contains("> Table preview truncated, omitted 5 rows. See CSV in assets/tables."),
        "got:\n{preview}"
    );
}

#[test]
fn csv_export_carries_the_full_table() {
    let mut blocks = vec![page(&["big"])];
    blocks.extend(single_column_table("big", 35));
    let document = normalize_page(&blocks, "T");

    let DocBlock::Table { rows, .. } = &document.blocks[0] else {
        panic!("expected a table block");
    };
    let csv = table_to_csv(rows);
    assert_eq!(csv.lines().count(), 36, "header plus 35 data rows");
    assert!(csv.starts_with("\"header\"\n\"row 1\""));
    assert!(csv.ends_with("\"row 35\""));
}

// ── Hostile input degradation ────────────────────────────────────────────

#[test]
fn cyclic_lists_and_dangling_ids_degrade_without_failing() {
    let blocks = vec![
        page(&["l1", "ghost"]),
        bullet("l1", "page", "loop a", &["l2"]),
        bullet("l2", "l1", "loop b", &["l1"]),
    ];
    let document = normalize_page(&blocks, "T");
    let markdown = render_markdown(&document);
    assert!(markdown.contains("- loop a\n  - loop b"), "got:\n{markdown}");
}

#[test]
fn images_without_tokens_degrade_to_unknown_blocks() {
    let blocks = vec![
        page(&["img1"]),
        RawBlock {
            image: Some(ImageContainer {
                token: Some(String::new()),
                file_token: None,
                alt: None,
            }),
            ..child("img1", block_type::IMAGE)
        },
    ];
    let document = normalize_page(&blocks, "T");
    assert!(document.assets.is_empty());
    let markdown = render_markdown(&document);
    assert!(
        markdown.contains("<!-- unsupported block type: 27 -->"),
        "got:\n{markdown}"
    );
}
