//! Recognizing references in lines of text and resolving them.

use std::sync::Arc;

use regex::Regex;

use crate::{
    cache::RefCache,
    models::EntityReference,
    resolve::ResolveError,
};

pub(crate) mod actions;
pub(crate) mod image;

pub(crate) use actions::ActionsParser;
pub(crate) use image::ImageParser;

/// A reference recognizer for one family of references.
///
/// Each parser owns its matching pattern, its exclusion policy, and the
/// collaborators it resolves through; [`Parser::replace`] only ever sees
/// the matched text.
#[async_trait::async_trait]
pub(crate) trait Parser: Send + Sync {
    /// The pattern used to find candidate references in a line.
    fn regex(&self) -> &Regex;

    /// Replaces the matching pattern.
    fn set_regex(&mut self, pattern: &str) -> Result<(), regex::Error>;

    /// Sets (or removes) the cache consulted before resolving.
    fn set_cache(&mut self, cache: Option<Arc<dyn RefCache>>);

    /// Resolves a matched reference to its pinned form.
    async fn replace(&self, matched: &str) -> Result<EntityReference, ResolveError>;

    /// Splits a matched reference into its parts without resolving it.
    fn convert_to_entity_ref(&self, matched: &str) -> Result<EntityReference, ResolveError>;

    /// Renders a resolved reference back into source text.
    fn render(&self, entity: &EntityReference) -> String {
        let EntityReference {
            name,
            reference,
            tag,
            prefix,
            ..
        } = entity;

        if tag.is_empty() {
            format!("{prefix}{name}@{reference}")
        } else if is_from_prefix(prefix) {
            // Dockerfiles have no trailing-comment syntax on FROM.
            format!("{prefix}{name}:{tag}@{reference}")
        } else {
            format!("{prefix}{name}@{reference} # {tag}")
        }
    }
}

/// Returns whether `prefix` is the keyword-and-flags part of a `FROM`.
fn is_from_prefix(prefix: &str) -> bool {
    let keyword = prefix.trim_start().split([' ', '\t']).next().unwrap_or_default();
    keyword.eq_ignore_ascii_case("FROM")
}

fn strip_tag(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((base, tag)) if !tag.contains('/') => base,
        _ => name,
    }
}

/// Splits an unresolved image literal into name and identifier.
///
/// A digest wins over a tag; a bare name is `latest`.
pub(crate) fn split_image_literal(literal: &str) -> Option<(&str, &str)> {
    if literal.is_empty() {
        return None;
    }

    match literal.split_once('@') {
        Some((name, digest)) => {
            if name.is_empty() || digest.is_empty() || digest.contains('@') {
                None
            } else {
                Some((strip_tag(name), digest))
            }
        }
        None => match literal.rsplit_once(':') {
            // `localhost:5000/app` is a registry port, not a tag.
            Some((name, tag)) if !tag.contains('/') => {
                (!name.is_empty() && !tag.is_empty()).then_some((name, tag))
            }
            _ => Some((literal, "latest")),
        },
    }
}
