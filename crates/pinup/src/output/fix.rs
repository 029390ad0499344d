//! Writing pinned contents back, or showing them on a dry run.

use anstream::{eprintln, print};
use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::replacer::ReplaceResult;

/// Writes every modified file in place, or prints the new contents to
/// stdout if `dry_run` is set.
pub(crate) fn apply_changes(result: &ReplaceResult, dry_run: bool) -> Result<()> {
    for path in &result.processed {
        tracing::debug!("processed {path}");
    }

    for (path, content) in &result.modified {
        if dry_run {
            print!("{content}");
        } else {
            std::fs::write(path, content).with_context(|| format!("failed to update {path}"))?;
        }

        tracing::info!(
            "📌 {pinned} {path}",
            pinned = (if dry_run { "would pin" } else { "pinned" }).green()
        );
    }

    print_summary(result, dry_run);
    Ok(())
}

fn print_summary(result: &ReplaceResult, dry_run: bool) {
    let nmodified = result.modified.len();
    let nprocessed = result.processed.len();

    if nmodified == 0 {
        eprintln!(
            "{} ({nprocessed} file{s} checked)",
            "All references are pinned.".green(),
            s = if nprocessed == 1 { "" } else { "s" },
        );
    } else {
        eprintln!(
            "{nmodified} of {nprocessed} file{s} {verb}",
            nmodified = nmodified.yellow(),
            s = if nprocessed == 1 { "" } else { "s" },
            verb = if dry_run { "would be modified" } else { "modified" },
        );
    }
}
