//! `uses:` references in GitHub Actions workflows and composite actions.

use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::{
    Parser,
    image::{image_excluded, image_names},
    split_image_literal,
};
use crate::{
    cache::RefCache,
    config::Config,
    github::RestClient,
    models::{ActionReference, EntityReference, ReferenceKind, yaml::KeyValue},
    oci_registry::ImageRegistry,
    resolve::{
        ResolveError, SkipReason, parse_image, resolve_action_checksum, resolve_image_digest,
    },
    utils::strip_quotes,
};

const DOCKER_SCHEME: &str = "docker://";

pub(crate) static ACTIONS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"uses:\s*[^\s]+/[^\s]+@[^\s]+|uses:\s*docker://[^\s]+:[^\s]+").unwrap()
});

pub(crate) struct ActionsParser {
    regex: Regex,
    cache: Option<Arc<dyn RefCache>>,
    rest: Arc<dyn RestClient>,
    registry: Arc<dyn ImageRegistry>,
    config: Arc<Config>,
}

impl ActionsParser {
    pub(crate) fn new(
        config: Arc<Config>,
        rest: Arc<dyn RestClient>,
        registry: Arc<dyn ImageRegistry>,
    ) -> Self {
        Self {
            regex: ACTIONS_PATTERN.clone(),
            cache: None,
            rest,
            registry,
            config,
        }
    }

    fn is_excluded(&self, value: &str) -> bool {
        self.config.ghactions.exclude.iter().any(|e| e == value)
    }

    /// Splits `matched` into its literal prefix and its unquoted value.
    fn split(matched: &str) -> (String, &str) {
        let (prefix, value) = match KeyValue::split(matched, "uses") {
            Some(kv) => (kv.prefix, kv.value),
            None => ("", matched.trim()),
        };
        (prefix.into(), strip_quotes(value))
    }

    async fn replace_action(
        &self,
        prefix: String,
        literal: &str,
    ) -> Result<EntityReference, ResolveError> {
        if ActionReference::is_local(literal) {
            return Err(ResolveError::skipped(SkipReason::Local, literal));
        }
        if self.is_excluded(literal) {
            return Err(ResolveError::skipped(SkipReason::Excluded, literal));
        }

        let action = ActionReference::parse(literal)?;
        if self.is_excluded(action.name) {
            return Err(ResolveError::skipped(SkipReason::Excluded, literal));
        }

        let sha = match self.cache.as_ref().and_then(|c| c.load(literal)) {
            Some(sha) => sha,
            None => {
                let sha = resolve_action_checksum(
                    self.rest.as_ref(),
                    &action,
                    &self.config.ghactions.exclude_branches,
                )
                .await?;
                if let Some(cache) = &self.cache {
                    cache.store(literal, &sha);
                }
                sha
            }
        };

        if sha == action.git_ref {
            return Err(ResolveError::skipped(SkipReason::AlreadyPinned, literal));
        }

        Ok(EntityReference {
            name: action.name.into(),
            reference: sha,
            kind: ReferenceKind::Action,
            tag: action.git_ref.into(),
            prefix,
        })
    }

    async fn replace_docker(
        &self,
        prefix: String,
        image: &str,
    ) -> Result<EntityReference, ResolveError> {
        if ActionReference::is_local(image) || self.is_excluded(image) {
            return Err(ResolveError::skipped(SkipReason::Excluded, image));
        }

        let reference = parse_image(image)?;
        if image_excluded(&reference, &self.config.images)
            || image_names(&reference).iter().any(|n| self.is_excluded(n))
        {
            return Err(ResolveError::skipped(SkipReason::Excluded, image));
        }

        let mut entity = resolve_image_digest(
            self.registry.as_ref(),
            image,
            self.config.platform.as_deref(),
            self.cache.as_deref(),
        )
        .await?;

        entity.prefix = prefix + DOCKER_SCHEME;
        Ok(entity)
    }
}

#[async_trait::async_trait]
impl Parser for ActionsParser {
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
        let (prefix, value) = Self::split(matched);

        match value.strip_prefix(DOCKER_SCHEME) {
            Some(image) => self.replace_docker(prefix, image).await,
            None => self.replace_action(prefix, value).await,
        }
    }

    fn convert_to_entity_ref(&self, matched: &str) -> Result<EntityReference, ResolveError> {
        let (_, value) = Self::split(matched);

        let (name, reference, kind) = match value.strip_prefix(DOCKER_SCHEME) {
            Some(image) => {
                let (name, reference) = split_image_literal(image).ok_or_else(|| {
                    ResolveError::InvalidImageReference {
                        reference: image.into(),
                        message: "expected name[:tag][@digest]".into(),
                    }
                })?;
                (name, reference, ReferenceKind::Container)
            }
            None => {
                let action = ActionReference::parse(value)?;
                (action.name, action.git_ref, ReferenceKind::Action)
            }
        };

        Ok(EntityReference {
            name: name.into(),
            reference: reference.into(),
            kind,
            tag: String::new(),
            prefix: String::new(),
        })
    }
}
