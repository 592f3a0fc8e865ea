use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use methoddiff::{build_options, run_method_diff, Args};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let opts = build_options(&args)?;

    if opts.dry_run {
        println!("== DRY RUN ==");
    }

    let summary = run_method_diff(&opts)?;

    println!("== methoddiff: Summary ==");
    for (tag, counts) in &summary.pairs {
        println!(
            "{tag:<10} added {:>5}  removed {:>5}  changed {:>5}  unchanged {:>5}",
            counts.added, counts.removed, counts.changed, counts.unchanged
        );
    }
    for skipped in &summary.skipped {
        println!("{:<10} skipped (missing {})", skipped.tag, skipped.missing.display());
    }
    let total = summary.total();
    println!(
        "{:<10} added {:>5}  removed {:>5}  changed {:>5}  unchanged {:>5}",
        "total", total.added, total.removed, total.changed, total.unchanged
    );
    if !opts.dry_run {
        println!("Output at: {:?}", opts.output_dir);
    }

    Ok(())
}
