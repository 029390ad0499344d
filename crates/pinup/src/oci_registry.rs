//! OCI registry access for image digest lookups.

use std::{fmt::Display, str::FromStr};

use moka::sync::Cache;
use oci_client::{
    Client, Reference,
    client::ClientConfig,
    errors::OciDistributionError,
    manifest::ImageIndexEntry,
    secrets::RegistryAuth,
};
use thiserror::Error;

/// An `os/arch` pair used to select one manifest out of a multi-arch index.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Platform {
    pub(crate) os: String,
    pub(crate) architecture: String,
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [os, architecture] if !os.is_empty() && !architecture.is_empty() => Ok(Self {
                os: (*os).into(),
                architecture: (*architecture).into(),
            }),
            _ => Err(format!("invalid platform '{s}': expected os/arch")),
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)
    }
}

#[derive(Debug, Error)]
pub(crate) enum RegistryError {
    #[error("couldn't fetch manifest for {reference}")]
    Distribution {
        reference: String,
        #[source]
        source: OciDistributionError,
    },
}

/// The registry surface the image resolver needs.
#[async_trait::async_trait]
pub(crate) trait ImageRegistry: Send + Sync {
    /// Returns the manifest digest (`sha256:...`) for `reference`.
    ///
    /// With a `platform`, the digest is that of the platform-specific
    /// manifest selected from the image index.
    async fn manifest_digest(
        &self,
        reference: &Reference,
        platform: Option<&Platform>,
    ) -> Result<String, RegistryError>;
}

/// Anonymous OCI registry client.
pub(crate) struct OciRegistryClient {
    default: Client,
    by_platform: Cache<Platform, Client>,
}

impl OciRegistryClient {
    pub(crate) fn new() -> Self {
        Self {
            default: Client::default(),
            by_platform: Cache::builder().build(),
        }
    }

    fn client_for(&self, platform: &Platform) -> Client {
        self.by_platform.get_with(platform.clone(), || {
            let wanted = platform.clone();
            Client::new(ClientConfig {
                platform_resolver: Some(Box::new(move |entries: &[ImageIndexEntry]| {
                    select_platform(entries, &wanted)
                })),
                ..Default::default()
            })
        })
    }
}

impl Default for OciRegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Picks the digest of the index entry matching `wanted`, if any.
fn select_platform(entries: &[ImageIndexEntry], wanted: &Platform) -> Option<String> {
    entries
        .iter()
        .find(|entry| {
            entry.platform.as_ref().is_some_and(|p| {
                p.os.to_string() == wanted.os && p.architecture.to_string() == wanted.architecture
            })
        })
        .map(|entry| entry.digest.clone())
}

#[async_trait::async_trait]
impl ImageRegistry for OciRegistryClient {
    #[tracing::instrument(skip(self), fields(reference = %reference))]
    async fn manifest_digest(
        &self,
        reference: &Reference,
        platform: Option<&Platform>,
    ) -> Result<String, RegistryError> {
        let auth = &RegistryAuth::Anonymous;

        let result = match platform {
            None => self.default.fetch_manifest_digest(reference, auth).await,
            Some(platform) => self
                .client_for(platform)
                .pull_image_manifest(reference, auth)
                .await
                .map(|(_, digest)| digest),
        };

        result.map_err(|source| RegistryError::Distribution {
            reference: reference.whole(),
            source,
        })
    }
}
