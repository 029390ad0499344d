//! Container image references: YAML `image:` keys and Dockerfile `FROM`.

use std::sync::{Arc, LazyLock};

use oci_client::Reference;
use regex::Regex;

use super::{Parser, split_image_literal};
use crate::{
    cache::RefCache,
    config::{Config, ImagesConfig},
    models::{
        EntityReference, ReferenceKind, dockerfile::FromInstruction, yaml::KeyValue,
    },
    oci_registry::ImageRegistry,
    resolve::{ResolveError, SkipReason, image_identifier, parse_image, resolve_image_digest},
    utils::strip_quotes,
};

pub(crate) static IMAGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimage\s*:\s*["']?[^\s"']+["']?|^\s*FROM\s+(?:--\S+\s+)*\S+"#).unwrap()
});

/// Every spelling an exclusion list may use for `reference`'s image:
/// the bare name, the repository, and the registry-qualified forms.
pub(crate) fn image_names(reference: &Reference) -> Vec<String> {
    let repository = reference.repository();
    let mut names = vec![
        repository.to_string(),
        format!("{}/{repository}", reference.registry()),
        format!("{}/{repository}", reference.resolve_registry()),
    ];
    if let Some((_, last)) = repository.rsplit_once('/') {
        names.push(last.to_string());
    }
    names
}

/// Returns whether `reference` is covered by the image exclusion lists.
pub(crate) fn image_excluded(reference: &Reference, config: &ImagesConfig) -> bool {
    let names = image_names(reference);
    config
        .exclude_images
        .iter()
        .any(|excluded| names.contains(excluded))
        || config
            .exclude_tags
            .iter()
            .any(|excluded| excluded == image_identifier(reference))
}

pub(crate) struct ImageParser {
    regex: Regex,
    cache: Option<Arc<dyn RefCache>>,
    registry: Arc<dyn ImageRegistry>,
    config: Arc<Config>,
}

impl ImageParser {
    pub(crate) fn new(config: Arc<Config>, registry: Arc<dyn ImageRegistry>) -> Self {
        Self {
            regex: IMAGE_PATTERN.clone(),
            cache: None,
            registry,
            config,
        }
    }

    /// Splits `matched` into its literal prefix and the image literal.
    fn split(matched: &str) -> (String, &str) {
        if let Some(from) = FromInstruction::parse(matched) {
            if let Some(platform) = from.platform() {
                tracing::debug!(
                    "FROM carries --platform={platform}; digests follow the configured platform"
                );
            }
            return (from.prefix.into(), from.image);
        }

        match KeyValue::split(matched, "image") {
            Some(kv) => (kv.prefix.into(), strip_quotes(kv.value)),
            None => (String::new(), strip_quotes(matched.trim())),
        }
    }
}

#[async_trait::async_trait]
impl Parser for ImageParser {
    fn regex(&self) -> &Regex {
        &self.regex
    }

    fn set_regex(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.regex = Regex::new(pattern)?;
        Ok(())
    }

    fn set_cache(&mut self, cache: Option<Arc<dyn RefCache>>) {
        self.cache = cache;
    }

    async fn replace(&self, matched: &str) -> Result<EntityReference, ResolveError> {
        let (prefix, image) = Self::split(matched);

        let reference = parse_image(image)?;
        if image_excluded(&reference, &self.config.images) {
            return Err(ResolveError::skipped(SkipReason::Excluded, image));
        }

        let mut entity = resolve_image_digest(
            self.registry.as_ref(),
            image,
            self.config.platform.as_deref(),
            self.cache.as_deref(),
        )
        .await?;

        entity.prefix = prefix;
        Ok(entity)
    }

    fn convert_to_entity_ref(&self, matched: &str) -> Result<EntityReference, ResolveError> {
        let (_, image) = Self::split(matched);

        let (name, reference) =
            split_image_literal(image).ok_or_else(|| ResolveError::InvalidImageReference {
                reference: image.into(),
                message: "expected name[:tag][@digest]".into(),
            })?;

        Ok(EntityReference {
            name: name.into(),
            reference: reference.into(),
            kind: ReferenceKind::Container,
            tag: String::new(),
            prefix: String::new(),
        })
    }
}
