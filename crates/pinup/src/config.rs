use std::fs;

use camino::Utf8Path;
use serde::Deserialize;
use thiserror::Error;

use crate::oci_registry::Platform;

const CONFIG_CANDIDATES: &[&str] = &[
    ".pinup.yml",
    ".pinup.yaml",
    ".github/pinup.yml",
    ".github/pinup.yaml",
];

#[derive(Error, Debug)]
#[error("configuration error in {path}")]
pub(crate) struct ConfigError {
    /// The path to the configuration file that caused this error.
    path: String,
    /// The source of this error.
    pub(crate) source: ConfigErrorInner,
}

#[derive(Error, Debug)]
pub(crate) enum ConfigErrorInner {
    /// An I/O error occurred while loading the configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is syntactically invalid.
    #[error("invalid configuration syntax")]
    Syntax(#[source] serde_yaml::Error),

    /// The `platform` field isn't an `os/arch` pair.
    #[error("{0}")]
    Platform(String),
}

/// Exclusions for GitHub Actions references.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ActionsConfig {
    /// Action names (`owner/repo`) or full literals (`owner/repo@ref`)
    /// that are never resolved.
    #[serde(default)]
    pub(crate) exclude: Vec<String>,
    /// Branches that are never pinned; `*` covers all of them.
    #[serde(default)]
    pub(crate) exclude_branches: Vec<String>,
}

fn default_exclude_images() -> Vec<String> {
    vec!["scratch".into()]
}

fn default_exclude_tags() -> Vec<String> {
    vec!["latest".into()]
}

/// Exclusions for container image references.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ImagesConfig {
    #[serde(default = "default_exclude_images")]
    pub(crate) exclude_images: Vec<String>,
    #[serde(default = "default_exclude_tags")]
    pub(crate) exclude_tags: Vec<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            exclude_images: default_exclude_images(),
            exclude_tags: default_exclude_tags(),
        }
    }
}

/// pinup's configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// An `os/arch` pair constraining image digest lookups.
    #[serde(default)]
    pub(crate) platform: Option<String>,
    #[serde(default)]
    pub(crate) ghactions: ActionsConfig,
    #[serde(default)]
    pub(crate) images: ImagesConfig,
}

impl Config {
    /// Loads a [`Config`] from the given contents.
    pub(crate) fn load(contents: &str) -> Result<Self, ConfigErrorInner> {
        // An empty (or comment-only) file is a valid, default config.
        let config = if contents
            .lines()
            .map(str::trim)
            .all(|line| line.is_empty() || line.starts_with('#'))
        {
            Self::default()
        } else {
            serde_yaml::from_str::<Self>(contents).map_err(ConfigErrorInner::Syntax)?
        };

        if let Some(platform) = &config.platform {
            platform
                .parse::<Platform>()
                .map_err(ConfigErrorInner::Platform)?;
        }

        Ok(config)
    }

    /// Loads a [`Config`] from the file at `path`.
    pub(crate) fn from_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        tracing::debug!("loading config from `{path}`");

        fs::read_to_string(path)
            .map_err(ConfigErrorInner::from)
            .and_then(|contents| Self::load(&contents))
            .map_err(|err| ConfigError {
                path: path.to_string(),
                source: err,
            })
    }

    /// Discover a [`Config`] according to pinup's precedence rules:
    /// 1. `--no-config` disables all config loading.
    /// 2. `--config <file>` uses the given config file.
    /// 3. Otherwise, we walk up from `start` looking for a config file.
    pub(crate) fn discover(
        no_config: bool,
        explicit: Option<&Utf8Path>,
        start: &Utf8Path,
    ) -> Result<Self, ConfigError> {
        if no_config {
            tracing::debug!("skipping config discovery: explicitly disabled");
            Ok(Self::default())
        } else if let Some(path) = explicit {
            Self::from_file(path)
        } else {
            Self::discover_in_dir(start).map(Option::unwrap_or_default)
        }
    }

    /// Discover a [`Config`] in the given directory or its ancestors.
    ///
    /// The search stops at the first directory containing a `.git`
    /// directory, or at the filesystem root.
    fn discover_in_dir(path: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        tracing::debug!("attempting config discovery in `{path}`");

        let canonical = path.canonicalize_utf8().map_err(|err| ConfigError {
            path: path.to_string(),
            source: err.into(),
        })?;
        let mut candidate_path = canonical.as_path();

        loop {
            for candidate in CONFIG_CANDIDATES {
                let candidate_path = candidate_path.join(candidate);
                if candidate_path.is_file() {
                    tracing::debug!("found config candidate at `{candidate_path}`");
                    return Self::from_file(&candidate_path).map(Some);
                }
            }

            if candidate_path.join(".git").is_dir() {
                tracing::debug!("found `{candidate_path}/.git`, stopping search");
                return Ok(None);
            }

            let Some(parent) = candidate_path.parent() else {
                tracing::debug!("reached filesystem root without finding a config");
                return Ok(None);
            };

            candidate_path = parent;
        }
    }

    /// Overrides the configured platform, e.g. from `--platform`.
    pub(crate) fn with_platform(mut self, platform: Option<&Platform>) -> Self {
        if let Some(platform) = platform {
            self.platform = Some(platform.to_string());
        }
        self
    }
}
