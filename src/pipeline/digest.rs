//! Image digest enrichment.
//!
//! The renderer leaves a placeholder fence under every image. This stage
//! locates each placeholder by its `id:` line, captions the image through an
//! [`ImageCaptioner`], and splices the formatted digest over the
//! placeholder's exact byte range. Bytes outside those ranges are never
//! touched, so hand edits elsewhere in the Markdown survive re-runs.
//!
//! ## Why a shared cursor instead of a task queue?
//!
//! Workers race on one atomic counter: every `fetch_add` hands out a
//! distinct task index, so each slot in the result table has exactly one
//! writer and needs no locking. When a task fails with fallback disabled, a
//! stop flag keeps idle workers from claiming new work; captions already in
//! flight finish and are discarded with the run.
//!
//! ```text
//!             ┌─ worker 0 ─ caption ─┐
//!  tasks ─────┼─ worker 1 ─ caption ─┼──▶ slots ──▶ splice, last offset first
//!   (cursor) ─┴─ worker 2 ─ caption ─┘
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::captioner::openai::OpenAiCaptioner;
use crate::captioner::{CaptionRequest, ImageCaption, ImageCaptioner, MockCaptioner};
use crate::config::DigestConfig;
use crate::docast::{DocBlock, Document};
use crate::error::{CaptionError, Feishu2MdError, Result};

/// Characters of surrounding Markdown collected on each side of a
/// placeholder as captioning context.
const CONTEXT_CHARS: usize = 220;

/// Matches a whole digest fence, placeholder or enriched, for stripping out
/// of context windows.
static DIGEST_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```image-digest.*?```").unwrap());

/// Outcome of one caption task: a formatted digest fence, or the error that
/// stopped it.
type CaptionOutcome = std::result::Result<String, CaptionError>;

/// One placeholder to replace, pinned to its byte range in the Markdown.
#[derive(Debug, Clone)]
struct CaptionTask {
    asset_id: String,
    image_path: PathBuf,
    start: usize,
    end: usize,
    context: String,
}

/// Replaces every image digest placeholder in `markdown` with a caption
/// produced by the configured backend.
///
/// Placeholders are matched to `document`'s asset registry by id; image
/// bytes are read from `assets_dir`. Markdown without placeholders (or a
/// document without assets) passes through unchanged. With
/// [`DigestConfig::fallback_on_error`] disabled, the first failed caption
/// aborts the run and the original Markdown should be kept.
pub async fn digest_markdown(
    document: &Document,
    markdown: &str,
    assets_dir: impl AsRef<Path>,
    config: &DigestConfig,
) -> Result<String> {
    // ── Step 1: pin down placeholder byte ranges ─────────────────────────
    let tasks = scan_tasks(document, markdown, assets_dir.as_ref())?;
    if tasks.is_empty() {
        debug!("No image digest placeholders to enrich");
        return Ok(markdown.to_string());
    }

    // ── Step 2: caption concurrently over a shared cursor ────────────────
    let captioner = resolve_captioner(config);
    let worker_count = config.concurrency.max(1).min(tasks.len());
    info!(
        "Captioning {} images with {} workers",
        tasks.len(),
        worker_count
    );
    let results =
        run_caption_tasks(&tasks, captioner, config.fallback_on_error, worker_count).await;

    // ── Step 3: splice digests back over the placeholders ────────────────
    commit_replacements(markdown, &tasks, results)
}

/// File-to-file variant of [`digest_markdown`].
///
/// Loads the document JSON and the rendered Markdown, enriches the
/// placeholders, and rewrites the Markdown atomically (write to a temp file,
/// then rename). On error the Markdown file is left exactly as it was.
pub async fn digest_file(
    docast_path: impl AsRef<Path>,
    markdown_path: impl AsRef<Path>,
    assets_dir: impl AsRef<Path>,
    config: &DigestConfig,
) -> Result<()> {
    let markdown_path = markdown_path.as_ref();
    let document = Document::load(docast_path).await?;
    let markdown = tokio::fs::read_to_string(markdown_path)
        .await
        .map_err(|source| Feishu2MdError::InputReadFailed {
            path: markdown_path.to_path_buf(),
            source,
        })?;

    let digested = digest_markdown(&document, &markdown, assets_dir, config).await?;

    let tmp_path = markdown_path.with_extension("md.tmp");
    tokio::fs::write(&tmp_path, &digested)
        .await
        .map_err(|source| Feishu2MdError::OutputWriteFailed {
            path: tmp_path.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp_path, markdown_path).await.map_err(|source| {
        Feishu2MdError::OutputWriteFailed {
            path: markdown_path.to_path_buf(),
            source,
        }
    })?;
    info!("Updated image digest blocks in {}", markdown_path.display());
    Ok(())
}

/// Walks the document's image blocks in order and finds the placeholder
/// fence for each one with a registered asset.
///
/// The pattern anchors on the full `id:` line, so an asset id that is a
/// prefix of another never matches the wrong fence. Only the first fence per
/// asset is taken, and a repeated asset id claims only one task, keeping a
/// single writer per fence. Blocks without an asset or a fence are skipped.
fn scan_tasks(document: &Document, markdown: &str, assets_dir: &Path) -> Result<Vec<CaptionTask>> {
    let mut tasks = Vec::new();
    let mut claimed: HashSet<&str> = HashSet::new();
    for block in &document.blocks {
        let DocBlock::Image { asset_id, .. } = block else {
            continue;
        };
        let Some(asset) = document.assets.get(asset_id) else {
            debug!("Image block references unregistered asset '{asset_id}', skipping");
            continue;
        };
        if !claimed.insert(asset_id.as_str()) {
            continue;
        }
        let pattern = format!(
            r"(?s)```image-digest\nid: {}\n.*?```",
            regex::escape(&asset.id)
        );
        let re = Regex::new(&pattern).map_err(|err| {
            Feishu2MdError::Internal(format!(
                "bad placeholder pattern for asset '{}': {err}",
                asset.id
            ))
        })?;
        let Some(found) = re.find(markdown) else {
            debug!("Asset {}: no digest placeholder in Markdown, skipping", asset.id);
            continue;
        };
        let file_name = Path::new(&asset.filename)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&asset.filename));
        tasks.push(CaptionTask {
            asset_id: asset.id.clone(),
            image_path: assets_dir.join(file_name),
            start: found.start(),
            end: found.end(),
            context: extract_nearby_context(markdown, found.start(), found.end()),
        });
    }
    Ok(tasks)
}

/// Collects up to [`CONTEXT_CHARS`] characters on each side of a placeholder,
/// sliced on char boundaries, with digest fences stripped so one image's
/// placeholder never leaks into another's prompt.
fn extract_nearby_context(markdown: &str, start: usize, end: usize) -> String {
    let before = &markdown[..start];
    let from = before
        .char_indices()
        .rev()
        .take(CONTEXT_CHARS)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(before.len());
    let after = &markdown[end..];
    let to = after
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(after.len());
    let before = DIGEST_FENCE_RE.replace_all(&before[from..], "");
    let after = DIGEST_FENCE_RE.replace_all(&after[..to], "");
    format!("{}\n{}", before.trim(), after.trim())
        .trim()
        .to_string()
}

/// An explicitly configured backend wins. Otherwise OpenAI credentials from
/// the environment are tried, falling back to the offline mock.
fn resolve_captioner(config: &DigestConfig) -> Arc<dyn ImageCaptioner> {
    if let Some(captioner) = &config.captioner {
        return Arc::clone(captioner);
    }
    if let Some(captioner) = OpenAiCaptioner::from_env() {
        let captioner = match &config.model {
            Some(model) => captioner.with_model(model.clone()),
            None => captioner,
        };
        info!("Captioning with OpenAI model {}", captioner.model());
        return Arc::new(captioner);
    }
    debug!("No captioner configured and OPENAI_API_KEY unset; using the offline mock");
    Arc::new(MockCaptioner)
}

/// Runs the worker pool. Each worker claims task indices off the shared
/// cursor until the tasks run out or the stop flag is set.
async fn run_caption_tasks(
    tasks: &[CaptionTask],
    captioner: Arc<dyn ImageCaptioner>,
    fallback_on_error: bool,
    worker_count: usize,
) -> Vec<(usize, CaptionOutcome)> {
    let cursor = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);

    let workers = (0..worker_count).map(|worker| {
        let captioner = Arc::clone(&captioner);
        let cursor = &cursor;
        let stop = &stop;
        async move {
            let mut completed: Vec<(usize, CaptionOutcome)> = Vec::new();
            loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                if index >= tasks.len() {
                    break;
                }
                let task = &tasks[index];
                let request = CaptionRequest {
                    image_path: task.image_path.clone(),
                    nearby_context: task.context.clone(),
                    asset_id: task.asset_id.clone(),
                };
                debug!("Worker {worker}: captioning asset {}", task.asset_id);
                match captioner.caption(&request).await {
                    Ok(caption) => {
                        completed.push((index, Ok(format_digest(&task.asset_id, &caption))));
                    }
                    Err(err) if fallback_on_error => {
                        warn!(
                            "Caption failed for asset {}, falling back to mock: {err}",
                            task.asset_id
                        );
                        let fallback = MockCaptioner.caption(&request).await;
                        completed.push((
                            index,
                            fallback.map(|caption| format_digest(&task.asset_id, &caption)),
                        ));
                    }
                    Err(err) => {
                        stop.store(true, Ordering::SeqCst);
                        completed.push((index, Err(err)));
                        break;
                    }
                }
            }
            completed
        }
    });

    futures::future::join_all(workers)
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Splices formatted digests over their placeholder ranges.
///
/// The cursor hands out each index once, so each slot here is written at
/// most once. Any task error aborts the run, surfacing the failure with the
/// lowest index. Replacements apply in descending start order, keeping
/// earlier byte offsets valid as the string grows and shrinks.
fn commit_replacements(
    markdown: &str,
    tasks: &[CaptionTask],
    results: Vec<(usize, CaptionOutcome)>,
) -> Result<String> {
    let mut slots: Vec<Option<String>> = vec![None; tasks.len()];
    let mut first_error: Option<(usize, CaptionError)> = None;
    for (index, outcome) in results {
        match outcome {
            Ok(digest) => slots[index] = Some(digest),
            Err(err) => match &first_error {
                Some((lowest, _)) if *lowest <= index => {}
                _ => first_error = Some((index, err)),
            },
        }
    }
    if let Some((index, source)) = first_error {
        return Err(Feishu2MdError::CaptionAborted {
            asset_id: tasks[index].asset_id.clone(),
            source,
        });
    }

    let mut order: Vec<usize> = (0..tasks.len()).collect();
    order.sort_by(|a, b| tasks[*b].start.cmp(&tasks[*a].start));
    let mut output = markdown.to_string();
    for index in order {
        if let Some(digest) = &slots[index] {
            output.replace_range(tasks[index].start..tasks[index].end, digest);
        }
    }
    Ok(output)
}

/// Formats a caption as the committed digest fence. Quoted values escape
/// backslashes and double quotes; empty lists keep their shape with a single
/// empty item, matching the placeholder.
fn format_digest(asset_id: &str, caption: &ImageCaption) -> String {
    let mut lines = vec![
        "```image-digest".to_string(),
        format!("id: {asset_id}"),
        format!("role: {}", caption.role),
        format!("summary: \"{}\"", escape_quoted(&caption.summary)),
        "key_points:".to_string(),
    ];
    lines.extend(quoted_items(&caption.key_points));
    lines.push("need_open_image_when:".to_string());
    lines.extend(quoted_items(&caption.need_open_image_when));
    lines.push(format!("confidence: {:.2}", caption.confidence));
    lines.push("```".to_string());
    lines.join("\n")
}

fn quoted_items(items: &[String]) -> Vec<String> {
    if items.is_empty() {
        return vec!["  - \"\"".to_string()];
    }
    items
        .iter()
        .map(|item| format!("  - \"{}\"", escape_quoted(item)))
        .collect()
}

/// Newlines collapse to spaces so a hostile caption cannot break the fence's
/// line structure.
fn escape_quoted(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}
