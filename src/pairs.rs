use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use glob::Pattern;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::Options;
use crate::diff::{Counts, PairDiff};
use crate::report::{write_pair_reports, write_summary};
use crate::scanner::scan;
use crate::utils::read_text_best_effort;

/// Built-in (old file, new file, tag) table.
pub const DEFAULT_PAIRS: &[(&str, &str, &str)] = &[
    ("rpg_core.js", "rmmz_core.js", "core"),
    ("rpg_managers.js", "rmmz_managers.js", "managers"),
    ("rpg_objects.js", "rmmz_objects.js", "objects"),
    ("rpg_scenes.js", "rmmz_scenes.js", "scenes"),
    ("rpg_sprites.js", "rmmz_sprites.js", "sprites"),
    ("rpg_windows.js", "rmmz_windows.js", "windows"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePair {
    pub old: PathBuf,
    pub new: PathBuf,
    pub tag: String,
}

pub fn default_pairs(old_dir: &Path, new_dir: &Path) -> Vec<FilePair> {
    DEFAULT_PAIRS
        .iter()
        .map(|(old, new, tag)| FilePair {
            old: old_dir.join(old),
            new: new_dir.join(new),
            tag: tag.to_string(),
        })
        .collect()
}

/// Parses `OLD:NEW:TAG`, resolving the file names against the two directories.
pub fn parse_pair(spec: &str, old_dir: &Path, new_dir: &Path) -> Result<FilePair> {
    let parts: Vec<&str> = spec.split(':').map(str::trim).collect();
    let [old, new, tag] = parts.as_slice() else {
        bail!("Invalid pair '{spec}': expected OLD:NEW:TAG");
    };
    if old.is_empty() || new.is_empty() || tag.is_empty() {
        bail!("Invalid pair '{spec}': empty component");
    }
    Ok(FilePair {
        old: old_dir.join(old),
        new: new_dir.join(new),
        tag: tag.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPair {
    pub tag: String,
    pub missing: PathBuf,
}

/// Per-tag counts of every processed pair.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Summary {
    #[serde(flatten)]
    pub pairs: BTreeMap<String, Counts>,
    #[serde(skip)]
    pub skipped: Vec<SkippedPair>,
}

impl Summary {
    pub fn total(&self) -> Counts {
        let mut total = Counts::default();
        for counts in self.pairs.values() {
            total += *counts;
        }
        total
    }
}

fn is_ignored(key: &str, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pat| pat.matches(key))
}

/// Reads, scans and diffs one pair. Keys matching `ignore` are dropped from
/// both sides first.
pub fn diff_pair(pair: &FilePair, ignore: &[Pattern]) -> Result<PairDiff> {
    let old_text = read_text_best_effort(&pair.old)?;
    let new_text = read_text_best_effort(&pair.new)?;

    let mut old = scan(&old_text);
    let mut new = scan(&new_text);
    if !ignore.is_empty() {
        old.retain(|k, _| !is_ignored(k, ignore));
        new.retain(|k, _| !is_ignored(k, ignore));
    }
    debug!(
        tag = %pair.tag,
        old_definitions = old.len(),
        new_definitions = new.len(),
        "scanned pair"
    );

    Ok(PairDiff::new(old, new))
}

fn missing_side(pair: &FilePair) -> Option<&Path> {
    [&pair.old, &pair.new]
        .into_iter()
        .find(|p| !p.is_file())
        .map(PathBuf::as_path)
}

pub fn run_method_diff(opts: &Options) -> Result<Summary> {
    if !opts.dry_run {
        fs::create_dir_all(&opts.output_dir).with_context(|| {
            format!("Failed to create output dir {}", opts.output_dir.display())
        })?;
    }

    let mut summary = Summary::default();

    for pair in &opts.pairs {
        if let Some(missing) = missing_side(pair) {
            warn!(tag = %pair.tag, path = %missing.display(), "missing file, skipping pair");
            summary.skipped.push(SkippedPair {
                tag: pair.tag.clone(),
                missing: missing.to_path_buf(),
            });
            continue;
        }

        let pair_diff = diff_pair(pair, &opts.ignore_patterns)?;

        if !opts.dry_run {
            let (json_path, md_path) =
                write_pair_reports(&opts.output_dir, pair, &pair_diff, &opts.report)?;
            info!(
                tag = %pair.tag,
                json = %json_path.display(),
                markdown = %md_path.display(),
                "wrote pair reports"
            );
        }

        summary.pairs.insert(pair.tag.clone(), pair_diff.counts());
    }

    if !opts.dry_run {
        let path = write_summary(&opts.output_dir, &summary)?;
        info!(path = %path.display(), "wrote summary");
    }

    Ok(summary)
}
