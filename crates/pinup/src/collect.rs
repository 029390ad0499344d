//! Discovery of files that may carry references.

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use ignore::WalkBuilder;
use thiserror::Error;
use tracing::instrument;

/// How `pinup` walks directories.
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub(crate) enum CollectionMode {
    /// Collect every candidate file, ignoring `.gitignore` files.
    All,
    /// Collect candidate files, respecting `.gitignore` files.
    #[default]
    Default,
}

impl CollectionMode {
    pub(crate) fn respects_gitignore(&self) -> bool {
        matches!(self, CollectionMode::Default)
    }
}

#[derive(Debug, Error)]
pub(crate) enum CollectError {
    #[error("couldn't walk directory")]
    Walk(#[from] ignore::Error),
    #[error("non-UTF-8 path")]
    NonUtf8Path(#[from] camino::FromPathError),
}

/// Returns whether `path` names a YAML file or a Dockerfile.
pub(crate) fn is_candidate(path: &Utf8Path) -> bool {
    matches!(path.extension(), Some("yml" | "yaml"))
        || path
            .file_name()
            .is_some_and(|name| name.to_lowercase().contains("dockerfile"))
}

/// Collects candidate files under `input_path`, in lexical order.
///
/// A file given directly is returned as-is, regardless of its name.
#[instrument(skip(mode))]
pub(crate) fn collect_files(
    input_path: &Utf8Path,
    mode: CollectionMode,
) -> Result<Vec<Utf8PathBuf>, CollectError> {
    if input_path.is_file() {
        return Ok(vec![input_path.to_path_buf()]);
    }

    // Start with all filters disabled, i.e. walk everything.
    let mut walker = WalkBuilder::new(input_path);
    let walker = walker
        .standard_filters(false)
        .filter_entry(|entry| entry.file_name() != ".git");

    // We honor `.gitignore` and similar files even if `.git/` is not
    // present, since sources are often checked out without it.
    if mode.respects_gitignore() {
        walker
            .require_git(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);
    }

    let mut files = vec![];
    for entry in walker.build() {
        let entry = entry?;
        let path = <&Utf8Path>::try_from(entry.path())?;

        if path.is_file() && is_candidate(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    tracing::debug!("collected {} files", files.len());

    Ok(files)
}
