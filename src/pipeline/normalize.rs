//! Raw Feishu block tree to document AST.
//!
//! The input is UNTRUSTED: any field may be missing, children may point at
//! ids that do not exist, and child chains may loop. Normalization therefore
//! never fails on input shape. It degrades instead:
//!
//! * dangling references are skipped,
//! * cyclic or absurdly deep child chains are cut with a terminal node,
//! * unrecognised block types survive as [`DocBlock::Unknown`] so the
//!   renderer can keep a trace of them,
//! * image blocks without a token degrade to unknown blocks rather than
//!   registering an unaddressable asset.
//!
//! The only error path is the final validation of the normalizer's OWN
//! output, which guards against bugs here rather than bad input.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::docast::{Asset, AssetKind, DocBlock, Document, ListNode, Marks, Source, TextRun};
use crate::error::Result;
use crate::feishu::{block_type, RawBlock, TextElement};

/// Deepest child chain any traversal follows. Beyond this a chain is treated
/// like a cycle and cut, keeping recursion depth bounded on hostile input.
const MAX_TREE_DEPTH: usize = 64;

/// Builds a validated [`Document`] from a raw block list.
///
/// Document order follows the `children` lists of the page blocks, not the
/// order of `raw_blocks` itself.
pub fn normalize(
    raw_blocks: &[RawBlock],
    doc_id: &str,
    title: &str,
    source_url: &str,
) -> Result<Document> {
    let index: HashMap<&str, &RawBlock> = raw_blocks
        .iter()
        .map(|block| (block.block_id.as_str(), block))
        .collect();

    let mut blocks = Vec::new();
    let mut assets = BTreeMap::new();

    let root_children = raw_blocks
        .iter()
        .filter(|block| block.block_type == block_type::PAGE)
        .flat_map(|block| block.children.iter());

    for child_id in root_children {
        let Some(block) = index.get(child_id.as_str()).copied() else {
            debug!("Skipping dangling root child '{child_id}'");
            continue;
        };
        if let Some(doc_block) = to_doc_block(block, &index, &mut assets) {
            blocks.push(doc_block);
        }
    }

    let document = Document {
        doc_id: doc_id.to_string(),
        title: title.to_string(),
        source: Source::feishu_doc(source_url),
        blocks,
        assets,
    };
    document.validate()?;
    debug!(
        "Normalized {} raw blocks into {} document blocks and {} assets",
        raw_blocks.len(),
        document.blocks.len(),
        document.assets.len()
    );
    Ok(document)
}

fn to_doc_block(
    block: &RawBlock,
    index: &HashMap<&str, &RawBlock>,
    assets: &mut BTreeMap<String, Asset>,
) -> Option<DocBlock> {
    let id = block.block_id.clone();
    if let Some(level) = heading_level(block.block_type) {
        return Some(DocBlock::Heading {
            id,
            level,
            text_runs: to_text_runs(block),
        });
    }
    match block.block_type {
        block_type::TEXT => Some(DocBlock::Paragraph {
            id,
            text_runs: to_text_runs(block),
        }),
        block_type::BULLET | block_type::ORDERED => {
            // A list block owned by another list renders inside its parent's
            // item tree, never as a top-level list of its own.
            if !block.parent_id.is_empty() {
                if let Some(parent) = index.get(block.parent_id.as_str()).copied() {
                    if is_list_type(parent.block_type) {
                        return None;
                    }
                }
            }
            let mut visiting = HashSet::new();
            Some(DocBlock::List {
                id,
                ordered: block.block_type == block_type::ORDERED,
                items: vec![collect_list_node(block, index, &mut visiting, 0)],
            })
        }
        block_type::CODE => Some(DocBlock::Code {
            id,
            language: block
                .code
                .as_ref()
                .and_then(|code| code.language)
                .map(|language| language.to_string()),
            text_runs: to_text_runs(block),
        }),
        block_type::QUOTE => Some(DocBlock::Quote {
            id,
            text_runs: to_text_runs(block),
        }),
        block_type::TODO => Some(DocBlock::Todo {
            id,
            checked: block
                .todo
                .as_ref()
                .and_then(|todo| todo.style.as_ref())
                .and_then(|style| style.done)
                .unwrap_or(false),
            text_runs: to_text_runs(block),
        }),
        block_type::CALLOUT => Some(DocBlock::Callout {
            id,
            text_runs: to_text_runs(block),
        }),
        block_type::DIVIDER => Some(DocBlock::Divider { id }),
        block_type::IMAGE => Some(to_image_block(block, assets)),
        block_type::TABLE => Some(DocBlock::Table {
            id,
            rows: extract_table_rows(block, index),
            truncated: None,
            omitted_rows: None,
        }),
        other => Some(DocBlock::Unknown { id, raw_type: other }),
    }
}

/// Collapses the nine provider heading types onto Markdown's six levels.
fn heading_level(block_type: i64) -> Option<u8> {
    match block_type {
        block_type::HEADING1..=block_type::HEADING6 => Some((block_type - 2) as u8),
        block_type::HEADING7..=block_type::HEADING9 => Some(6),
        _ => None,
    }
}

fn is_list_type(block_type: i64) -> bool {
    matches!(block_type, block_type::BULLET | block_type::ORDERED)
}

/// The element list a block's text lives in. Which container is populated
/// depends on the block type; probing them all keeps this total.
fn block_elements(block: &RawBlock) -> &[TextElement] {
    let text_like = block
        .text
        .as_ref()
        .or(block.heading1.as_ref())
        .or(block.heading2.as_ref())
        .or(block.heading3.as_ref())
        .or(block.heading4.as_ref())
        .or(block.heading5.as_ref())
        .or(block.heading6.as_ref())
        .or(block.heading7.as_ref())
        .or(block.heading8.as_ref())
        .or(block.heading9.as_ref())
        .or(block.bullet.as_ref())
        .or(block.ordered.as_ref())
        .or(block.quote.as_ref())
        .or(block.callout.as_ref());
    if let Some(container) = text_like {
        &container.elements
    } else if let Some(todo) = &block.todo {
        &todo.elements
    } else if let Some(table_cell) = &block.table_cell {
        &table_cell.elements
    } else if let Some(code) = &block.code {
        &code.elements
    } else {
        &[]
    }
}

fn to_text_runs(block: &RawBlock) -> Vec<TextRun> {
    block_elements(block).iter().map(to_text_run).collect()
}

fn to_text_run(element: &TextElement) -> TextRun {
    TextRun {
        text: element_text(element),
        marks: element_marks(element),
    }
}

/// Visible text of one element. Non-text elements (equations, reminder
/// mentions, person mentions) contribute their display string.
fn element_text(element: &TextElement) -> String {
    if let Some(content) = element.text_run.as_ref().and_then(|run| run.content.as_ref()) {
        return content.clone();
    }
    if let Some(content) = element
        .equation
        .as_ref()
        .and_then(|equation| equation.content.as_ref())
    {
        return content.clone();
    }
    if let Some(title) = element
        .reminder
        .as_ref()
        .and_then(|reminder| reminder.mention.as_ref())
        .and_then(|mention| mention.title.as_ref())
    {
        return title.clone();
    }
    if let Some(name) = element.person.as_ref().and_then(|person| person.name.as_ref()) {
        return name.clone();
    }
    String::new()
}

fn element_marks(element: &TextElement) -> Option<Marks> {
    let link = element
        .docs_link
        .as_ref()
        .and_then(|docs_link| docs_link.url.clone());
    if let Some(style) = &element.text_element_style {
        return Some(Marks {
            bold: style.bold,
            italic: style.italic,
            strike: style.strikethrough,
            code: style.inline_code,
            link,
        });
    }
    link.map(|url| Marks {
        link: Some(url),
        ..Marks::default()
    })
}

/// Collects a list block and its nested list children into a [`ListNode`].
///
/// `visiting` holds the ids on the CURRENT path. Seeing one again means the
/// chain loops, so the repeated block becomes a terminal node with no
/// children, as does any block past [`MAX_TREE_DEPTH`].
fn collect_list_node(
    block: &RawBlock,
    index: &HashMap<&str, &RawBlock>,
    visiting: &mut HashSet<String>,
    depth: usize,
) -> ListNode {
    let ordered = block.block_type == block_type::ORDERED;
    if visiting.contains(&block.block_id) || depth >= MAX_TREE_DEPTH {
        if visiting.contains(&block.block_id) {
            warn!(
                "List child chain loops back to block '{}'; cutting it here",
                block.block_id
            );
        } else {
            warn!(
                "List nesting exceeds {MAX_TREE_DEPTH} levels at block '{}'; cutting it here",
                block.block_id
            );
        }
        return ListNode {
            id: block.block_id.clone(),
            ordered,
            text_runs: to_text_runs(block),
            children: vec![],
        };
    }
    visiting.insert(block.block_id.clone());
    let mut children = Vec::new();
    for child_id in &block.children {
        let Some(child) = index.get(child_id.as_str()).copied() else {
            continue;
        };
        if is_list_type(child.block_type) {
            children.push(collect_list_node(child, index, visiting, depth + 1));
        }
    }
    visiting.remove(&block.block_id);
    ListNode {
        id: block.block_id.clone(),
        ordered,
        text_runs: to_text_runs(block),
        children,
    }
}

/// Flattens a block subtree to plain text for table cells: own text first,
/// then each child's, single-space separated.
///
/// `visited` persists across the whole traversal, so every block contributes
/// at most once and cyclic references simply go quiet.
fn collect_plain_text(
    block_id: &str,
    index: &HashMap<&str, &RawBlock>,
    visited: &mut HashSet<String>,
    depth: usize,
) -> String {
    if visited.contains(block_id) || depth >= MAX_TREE_DEPTH {
        return String::new();
    }
    let Some(block) = index.get(block_id).copied() else {
        return String::new();
    };
    visited.insert(block_id.to_string());

    let own: String = to_text_runs(block)
        .iter()
        .map(|run| run.text.as_str())
        .collect::<String>()
        .trim()
        .to_string();

    let mut parts = Vec::new();
    if !own.is_empty() {
        parts.push(own);
    }
    for child_id in &block.children {
        let child_text = collect_plain_text(child_id, index, visited, depth + 1);
        if !child_text.is_empty() {
            parts.push(child_text);
        }
    }
    parts.join(" ").trim().to_string()
}

/// Extracts a table as a plain-text grid. Newer exports carry a `cells` grid
/// of table-cell ids on the table block; older ones nest row blocks under
/// `children` with cell blocks under each row.
fn extract_table_rows(block: &RawBlock, index: &HashMap<&str, &RawBlock>) -> Vec<Vec<String>> {
    if let Some(cells) = block.table.as_ref().and_then(|table| table.cells.as_ref()) {
        if !cells.is_empty() {
            return cells
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|cell_id| {
                            let mut visited = HashSet::new();
                            collect_plain_text(cell_id, index, &mut visited, 0)
                        })
                        .collect()
                })
                .collect();
        }
    }

    let mut rows = Vec::new();
    for row_id in &block.children {
        let Some(row_block) = index.get(row_id.as_str()).copied() else {
            continue;
        };
        let cells: Vec<String> = row_block
            .children
            .iter()
            .map(|cell_id| {
                let mut visited = HashSet::new();
                collect_plain_text(cell_id, index, &mut visited, 0)
            })
            .collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
    rows
}

/// Registers the image's asset and returns the image block. Without a token
/// there is nothing to download later, so the block degrades to unknown.
fn to_image_block(block: &RawBlock, assets: &mut BTreeMap<String, Asset>) -> DocBlock {
    let id = block.block_id.clone();
    let image = block.image.as_ref();
    let token = image
        .and_then(|image| image.token.clone().or_else(|| image.file_token.clone()))
        .filter(|token| !token.is_empty());
    let Some(token) = token else {
        warn!("Image block '{id}' carries no token; keeping it as an unknown block");
        return DocBlock::Unknown {
            id,
            raw_type: block.block_type,
        };
    };
    assets.insert(
        token.clone(),
        Asset {
            id: token.clone(),
            kind: AssetKind::Image,
            token: token.clone(),
            filename: format!("assets/images/{}.bin", sanitize_file_name(&token)),
            mime: None,
            source_block_id: id.clone(),
        },
    );
    let caption_runs = image
        .and_then(|image| image.alt.as_ref())
        .filter(|alt| !alt.is_empty())
        .map(|alt| vec![TextRun::plain(alt.clone())])
        .unwrap_or_default();
    DocBlock::Image {
        id,
        asset_id: token,
        caption_runs,
    }
}

/// Keeps ASCII alphanumerics plus `.`, `_`, `-`; everything else becomes `_`.
fn sanitize_file_name(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
