//! Reference models and the small tokenizers that recover them from text.

use std::fmt::Display;

use serde::Serialize;
use thiserror::Error;

pub(crate) mod dockerfile;
pub(crate) mod yaml;

/// What kind of artifact a reference points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ReferenceKind {
    Action,
    Container,
}

impl Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Action => f.write_str("action"),
            Self::Container => f.write_str("container"),
        }
    }
}

/// A resolved or listed reference to an external artifact.
///
/// Ordering is by name first, then by the remaining fields, which gives
/// listings a deterministic order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub(crate) struct EntityReference {
    /// The artifact's identity, e.g. `actions/checkout` or
    /// `index.docker.io/library/golang`.
    pub(crate) name: String,
    /// The immutable identifier, or the mutable tag when listing.
    #[serde(rename = "ref")]
    pub(crate) reference: String,
    #[serde(rename = "type")]
    pub(crate) kind: ReferenceKind,
    /// The mutable tag or branch that was replaced.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) tag: String,
    /// The literal source text that preceded the reference.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub(crate) prefix: String,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ActionParseError {
    #[error("invalid action reference '{0}': expected exactly one '@'")]
    Reference(String),
    #[error("invalid action '{0}': expected at least owner/repo")]
    Action(String),
}

/// An `owner/repo[/path]@ref` action literal, split into its parts.
#[derive(Debug, PartialEq)]
pub(crate) struct ActionReference<'a> {
    /// Everything before the `@`, including any subpath.
    pub(crate) name: &'a str,
    pub(crate) owner: &'a str,
    pub(crate) repo: &'a str,
    pub(crate) git_ref: &'a str,
}

impl<'a> ActionReference<'a> {
    /// Returns whether `literal` names an action in the same repository.
    pub(crate) fn is_local(literal: &str) -> bool {
        literal.starts_with("./") || literal.starts_with("../")
    }

    /// Splits `literal` (already stripped of quotes) into its parts.
    pub(crate) fn parse(literal: &'a str) -> Result<Self, ActionParseError> {
        let mut frags = literal.split('@');
        let (Some(name), Some(git_ref), None) = (frags.next(), frags.next(), frags.next()) else {
            return Err(ActionParseError::Reference(literal.into()));
        };

        if git_ref.is_empty() {
            return Err(ActionParseError::Reference(literal.into()));
        }

        // Sub-actions carry extra path segments; only the first two matter.
        let mut segments = name.split('/');
        match (segments.next(), segments.next()) {
            (Some(owner), Some(repo)) if !owner.is_empty() && !repo.is_empty() => Ok(Self {
                name,
                owner,
                repo,
                git_ref,
            }),
            _ => Err(ActionParseError::Action(name.into())),
        }
    }
}
