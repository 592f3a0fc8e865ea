use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

use crate::diff::{Counts, PairDiff};
use crate::pairs::{FilePair, Summary};
use crate::scanner::DefinitionRecord;

#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Entries listed per Markdown section before the "more" line.
    pub max_listed: usize,
    pub body_diff: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            max_listed: 20000,
            body_diff: false,
        }
    }
}

#[derive(Serialize)]
struct PairInfo<'a> {
    old: String,
    new: String,
    tag: &'a str,
}

#[derive(Serialize)]
struct KeyedRecord<'a> {
    key: &'a str,
    #[serde(flatten)]
    record: &'a DefinitionRecord,
}

#[derive(Serialize)]
struct ChangedRecord<'a> {
    key: &'a str,
    old: &'a DefinitionRecord,
    new: &'a DefinitionRecord,
}

#[derive(Serialize)]
struct Patch<'a> {
    pair: PairInfo<'a>,
    counts: Counts,
    added: Vec<KeyedRecord<'a>>,
    removed: Vec<KeyedRecord<'a>>,
    changed: Vec<ChangedRecord<'a>>,
}

fn keyed<'a>((key, record): (&'a str, &'a DefinitionRecord)) -> KeyedRecord<'a> {
    KeyedRecord { key, record }
}

pub fn patch_json(pair: &FilePair, diff: &PairDiff) -> Result<String> {
    let patch = Patch {
        pair: PairInfo {
            old: pair.old.display().to_string(),
            new: pair.new.display().to_string(),
            tag: &pair.tag,
        },
        counts: diff.counts(),
        added: diff.added().map(keyed).collect(),
        removed: diff.removed().map(keyed).collect(),
        changed: diff
            .changed()
            .map(|(key, old, new)| ChangedRecord { key, old, new })
            .collect(),
    };
    serde_json::to_string_pretty(&patch).context("Failed to serialize patch")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// `-`/`+`/` ` prefixed line diff of two bodies.
pub fn annotate_body_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Equal => ' ',
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
        };
        output.push(sign);
        output.push_str(change.value());
        if change.missing_newline() {
            output.push('\n');
        }
    }
    output
}

fn push_listing(
    lines: &mut Vec<String>,
    title: &str,
    entries: &[(&str, &DefinitionRecord)],
    limit: usize,
) {
    if entries.is_empty() {
        return;
    }
    lines.push(format!("## {title}\n"));
    for (key, record) in entries.iter().take(limit) {
        let mark = if record.truncated { " (truncated)" } else { "" };
        lines.push(format!("- `{key}` — {}{mark}", record.signature));
    }
    if entries.len() > limit {
        lines.push(format!("- … (+{} more)", entries.len() - limit));
    }
    lines.push(String::new());
}

pub fn render_markdown(pair: &FilePair, diff: &PairDiff, opts: &ReportOptions) -> String {
    let counts = diff.counts();
    let mut lines = vec![
        format!(
            "# {}: {} ↔ {}\n",
            pair.tag,
            file_name(&pair.old),
            file_name(&pair.new)
        ),
        format!("- Added in new: **{}**", counts.added),
        format!("- Removed from old: **{}**", counts.removed),
        format!("- Changed: **{}**\n", counts.changed),
    ];

    let added: Vec<_> = diff.added().collect();
    push_listing(&mut lines, "Added in new", &added, opts.max_listed);
    let removed: Vec<_> = diff.removed().collect();
    push_listing(&mut lines, "Removed from old", &removed, opts.max_listed);

    let changed: Vec<_> = diff.changed().collect();
    if !changed.is_empty() {
        lines.push("## Changed\n".to_string());
        for (key, old, new) in changed.iter().take(opts.max_listed) {
            lines.push(format!("- `{key}`"));
            if opts.body_diff {
                lines.push(String::new());
                lines.push("```diff".to_string());
                lines.push(annotate_body_diff(&old.body, &new.body).trim_end().to_string());
                lines.push("```".to_string());
                lines.push(String::new());
            }
        }
        if changed.len() > opts.max_listed {
            lines.push(format!("- … (+{} more)", changed.len() - opts.max_listed));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Writes `<tag>_patch.json` and `<tag>_patch.md` into `out_dir`.
pub fn write_pair_reports(
    out_dir: &Path,
    pair: &FilePair,
    diff: &PairDiff,
    opts: &ReportOptions,
) -> Result<(PathBuf, PathBuf)> {
    let json_path = out_dir.join(format!("{}_patch.json", pair.tag));
    fs::write(&json_path, patch_json(pair, diff)?)
        .with_context(|| format!("Failed to write {}", json_path.display()))?;

    let md_path = out_dir.join(format!("{}_patch.md", pair.tag));
    fs::write(&md_path, render_markdown(pair, diff, opts))
        .with_context(|| format!("Failed to write {}", md_path.display()))?;

    Ok((json_path, md_path))
}

pub fn write_summary(out_dir: &Path, summary: &Summary) -> Result<PathBuf> {
    let path = out_dir.join("summary.json");
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize summary")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
