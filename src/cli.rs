use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use glob::Pattern;

use crate::pairs::{default_pairs, parse_pair, FilePair};
use crate::report::ReportOptions;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding the old-variant sources
    #[arg(long = "old", visible_alias = "mv", default_value = "mv")]
    pub old_dir: PathBuf,

    /// Directory holding the new-variant sources
    #[arg(long = "new", visible_alias = "mz", default_value = "mz")]
    pub new_dir: PathBuf,

    /// Output directory for the reports
    #[arg(long = "out", default_value = "diff_reports")]
    pub output_dir: PathBuf,

    /// File pair as OLD:NEW:TAG (repeatable; replaces the built-in table)
    #[arg(short, long = "pair")]
    pub pairs: Vec<String>,

    /// Glob patterns over definition keys to leave out, e.g. 'class:*'
    #[arg(short, long, value_delimiter = ',', num_args = 1..)]
    pub ignore: Vec<String>,

    /// Max entries listed per section of the Markdown brief
    #[arg(long, default_value_t = 20000)]
    pub max_listed: usize,

    /// Add a line diff of old/new bodies for every changed definition
    #[arg(long)]
    pub body_diff: bool,

    /// Do not write anything; only print the summary
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct Options {
    pub output_dir: PathBuf,
    pub pairs: Vec<FilePair>,
    pub ignore_patterns: Vec<Pattern>,
    pub report: ReportOptions,
    pub dry_run: bool,
}

pub fn build_options(args: &Args) -> Result<Options> {
    if args.old_dir == args.new_dir {
        bail!("old and new directories cannot be the same directory.");
    }

    let patterns = args
        .ignore
        .iter()
        .map(|s| Pattern::new(s).with_context(|| format!("Invalid glob pattern: {s}")))
        .collect::<Result<Vec<_>>>()?;

    let pairs = if args.pairs.is_empty() {
        default_pairs(&args.old_dir, &args.new_dir)
    } else {
        args.pairs
            .iter()
            .map(|s| parse_pair(s, &args.old_dir, &args.new_dir))
            .collect::<Result<Vec<_>>>()?
    };

    let mut tags = HashSet::new();
    for pair in &pairs {
        if !tags.insert(pair.tag.as_str()) {
            bail!("Duplicate pair tag: {}", pair.tag);
        }
    }

    Ok(Options {
        output_dir: args.output_dir.clone(),
        pairs,
        ignore_patterns: patterns,
        report: ReportOptions {
            max_listed: args.max_listed,
            body_diff: args.body_diff,
        },
        dry_run: args.dry_run,
    })
}
