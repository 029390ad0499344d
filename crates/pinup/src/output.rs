//! Rendering results for the user.

use clap::ValueEnum;

pub(crate) mod fix;
pub(crate) mod json;
pub(crate) mod plain;

/// How `list` renders the references it finds.
#[derive(Debug, Default, Copy, Clone, ValueEnum)]
pub(crate) enum ListFormat {
    /// An aligned, numbered table.
    #[default]
    Table,
    /// A JSON array of references.
    Json,
}
