//! Resolution of mutable references to immutable identifiers.
//!
//! Actions resolve to commit SHAs through the GitHub REST API; images
//! resolve to manifest digests through their OCI registry.

use std::fmt::Display;

use oci_client::Reference;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    cache::RefCache,
    github::{ClientError, RestClient},
    models::{ActionParseError, ActionReference, EntityReference, ReferenceKind},
    oci_registry::{ImageRegistry, Platform, RegistryError},
    utils::is_commit_sha,
};

/// Why a reference was deliberately left alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// A `./` or `../` action in the same repository.
    Local,
    /// Matched an exclusion list.
    Excluded,
    /// A branch covered by `exclude_branches`.
    ExcludedBranch,
    /// Already expressed as a SHA or digest.
    AlreadyPinned,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Local => "local reference",
            Self::Excluded => "excluded",
            Self::ExcludedBranch => "excluded branch",
            Self::AlreadyPinned => "already pinned",
        })
    }
}

#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    /// Not a failure: the reference is intentionally not rewritten.
    #[error("skipped {reference} ({reason})")]
    Skipped {
        reason: SkipReason,
        reference: String,
    },
    #[error("invalid action reference '{0}': expected exactly one '@'")]
    InvalidActionReference(String),
    #[error("invalid action '{0}': expected at least owner/repo")]
    InvalidAction(String),
    #[error("{0}")]
    InvalidPlatform(String),
    #[error("invalid image reference '{reference}': {message}")]
    InvalidImageReference { reference: String, message: String },
    #[error("action reference {action}@{git_ref} is not a tag nor branch")]
    NotTagNorBranch { action: String, git_ref: String },
    #[error("unexpected response from {path}")]
    MalformedResponse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("GitHub API returned {status} for {path}")]
    UnexpectedStatus { path: String, status: StatusCode },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ResolveError {
    pub(crate) fn skipped(reason: SkipReason, reference: impl Into<String>) -> Self {
        Self::Skipped {
            reason,
            reference: reference.into(),
        }
    }

    /// Returns whether this is a deliberate skip rather than a failure.
    pub(crate) fn is_skip(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns whether the reference itself could not be understood.
    pub(crate) fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::InvalidActionReference(_)
                | Self::InvalidAction(_)
                | Self::InvalidPlatform(_)
                | Self::InvalidImageReference { .. }
        )
    }
}

impl From<ActionParseError> for ResolveError {
    fn from(value: ActionParseError) -> Self {
        match value {
            ActionParseError::Reference(r) => Self::InvalidActionReference(r),
            ActionParseError::Action(a) => Self::InvalidAction(a),
        }
    }
}

/// The `object` of a git ref or annotated tag.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct GitObject {
    pub(crate) sha: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: GitObject,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RefPayload {
    Single(GitRef),
    // GitHub answers with every ref sharing the prefix when there's no
    // exact match, e.g. `v4` when only `v4.1.0` and `v4.1.1` exist.
    Multiple(Vec<serde_json::Value>),
}

/// The outcome of a single ref lookup.
#[derive(Debug)]
pub(crate) enum RefLookup {
    Found(GitObject),
    NotFound,
    Malformed(serde_json::Error),
}

async fn get_reference(rest: &dyn RestClient, path: &str) -> Result<RefLookup, ResolveError> {
    let req = rest.new_request(Method::GET, path)?;
    let resp = rest.execute(req).await?;

    match resp.status() {
        StatusCode::NOT_FOUND => return Ok(RefLookup::NotFound),
        status if !status.is_success() => {
            return Err(ResolveError::UnexpectedStatus {
                path: path.into(),
                status,
            });
        }
        _ => {}
    }

    let body = resp.bytes().await.map_err(ClientError::from)?;

    Ok(match serde_json::from_slice::<RefPayload>(&body) {
        Ok(RefPayload::Single(r)) => RefLookup::Found(r.object),
        Ok(RefPayload::Multiple(_)) => RefLookup::NotFound,
        Err(e) => RefLookup::Malformed(e),
    })
}

fn found_sha(lookup: RefLookup, path: String) -> Result<Option<GitObject>, ResolveError> {
    match lookup {
        RefLookup::Found(object) => Ok(Some(object)),
        RefLookup::NotFound => Ok(None),
        RefLookup::Malformed(source) => Err(ResolveError::MalformedResponse { path, source }),
    }
}

async fn checksum_for_tag(
    rest: &dyn RestClient,
    owner: &str,
    repo: &str,
    tag: &str,
) -> Result<Option<String>, ResolveError> {
    let path = format!("repos/{owner}/{repo}/git/refs/tags/{tag}");
    let Some(object) = found_sha(get_reference(rest, &path).await?, path)? else {
        return Ok(None);
    };

    if object.kind == "commit" {
        return Ok(Some(object.sha));
    }

    // Annotated tag: one more hop to reach the commit.
    let path = format!("repos/{owner}/{repo}/git/tags/{sha}", sha = object.sha);
    Ok(found_sha(get_reference(rest, &path).await?, path)?.map(|o| o.sha))
}

async fn checksum_for_branch(
    rest: &dyn RestClient,
    owner: &str,
    repo: &str,
    branch: &str,
) -> Result<Option<String>, ResolveError> {
    let path = format!("repos/{owner}/{repo}/git/refs/heads/{branch}");
    Ok(found_sha(get_reference(rest, &path).await?, path)?.map(|o| o.sha))
}

fn branch_excluded(exclude_branches: &[String], branch: &str) -> bool {
    exclude_branches
        .iter()
        .any(|excluded| excluded == "*" || excluded == branch)
}

/// Resolves an action's ref to a commit SHA.
///
/// Tags win over branches of the same name. A full SHA is returned as-is.
#[tracing::instrument(skip(rest, exclude_branches), fields(action = action.name, git_ref = action.git_ref))]
pub(crate) async fn resolve_action_checksum(
    rest: &dyn RestClient,
    action: &ActionReference<'_>,
    exclude_branches: &[String],
) -> Result<String, ResolveError> {
    let ActionReference {
        name,
        owner,
        repo,
        git_ref,
    } = *action;

    if is_commit_sha(git_ref) {
        return Ok(git_ref.into());
    }

    if let Some(sha) = checksum_for_tag(rest, owner, repo, git_ref).await? {
        tracing::debug!("resolved tag {git_ref} to {sha}");
        return Ok(sha);
    }

    if branch_excluded(exclude_branches, git_ref) {
        return Err(ResolveError::skipped(
            SkipReason::ExcludedBranch,
            format!("{name}@{git_ref}"),
        ));
    }

    if let Some(sha) = checksum_for_branch(rest, owner, repo, git_ref).await? {
        tracing::debug!("resolved branch {git_ref} to {sha}");
        return Ok(sha);
    }

    Err(ResolveError::NotTagNorBranch {
        action: name.into(),
        git_ref: git_ref.into(),
    })
}

/// Parses an image reference, defaulting the registry to Docker Hub.
pub(crate) fn parse_image(image: &str) -> Result<Reference, ResolveError> {
    image
        .parse::<Reference>()
        .map_err(|e| ResolveError::InvalidImageReference {
            reference: image.into(),
            message: e.to_string(),
        })
}

/// Returns the identifier an image is currently referenced by.
pub(crate) fn image_identifier(reference: &Reference) -> &str {
    reference
        .digest()
        .or_else(|| reference.tag())
        .unwrap_or("latest")
}

/// Resolves an image reference to its manifest digest.
#[tracing::instrument(skip(registry, cache))]
pub(crate) async fn resolve_image_digest(
    registry: &dyn ImageRegistry,
    image: &str,
    platform: Option<&str>,
    cache: Option<&dyn RefCache>,
) -> Result<EntityReference, ResolveError> {
    let platform = platform
        .map(str::parse::<Platform>)
        .transpose()
        .map_err(ResolveError::InvalidPlatform)?;

    let reference = parse_image(image)?;
    let key = reference.whole();

    let digest = match cache.and_then(|c| c.load(&key)) {
        Some(digest) => digest,
        None => {
            let digest = registry
                .manifest_digest(&reference, platform.as_ref())
                .await?;
            if let Some(cache) = cache {
                cache.store(&key, &digest);
            }
            digest
        }
    };

    if reference.digest() == Some(digest.as_str()) {
        return Err(ResolveError::skipped(SkipReason::AlreadyPinned, image));
    }

    Ok(EntityReference {
        name: format!(
            "{registry}/{repository}",
            registry = reference.resolve_registry(),
            repository = reference.repository()
        ),
        reference: digest,
        kind: ReferenceKind::Container,
        // Digest-only references have no tag to keep.
        tag: reference.tag().unwrap_or_default().into(),
        prefix: String::new(),
    })
}
