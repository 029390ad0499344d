//! Rewriting (and listing) references across lines, files and directories.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use camino::{Utf8Path, Utf8PathBuf};
use futures::{StreamExt as _, TryStreamExt as _, stream};
use indicatif::ProgressStyle;
use thiserror::Error;
use tokio::{
    sync::{AcquireError, Semaphore},
    task::{JoinError, JoinSet},
};
use tracing::{Instrument as _, Span, info_span, instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::{
    cache::{LocalCache, RefCache, SharedCache},
    collect::{CollectError, CollectionMode, collect_files},
    config::Config,
    github::RestClient,
    models::EntityReference,
    oci_registry::ImageRegistry,
    parser::{ActionsParser, ImageParser, Parser},
    resolve::ResolveError,
};

/// The default number of files resolved concurrently.
pub(crate) const DEFAULT_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub(crate) enum ReplacerError {
    #[error("couldn't read {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to pin references in {path}")]
    File {
        path: Utf8PathBuf,
        #[source]
        source: ResolveError,
    },
    #[error("couldn't collect files")]
    Collect(#[from] CollectError),
    #[error("worker pool closed")]
    Closed(#[from] AcquireError),
    #[error("worker task failed")]
    Join(#[from] JoinError),
}

/// The outcome of a rewrite over one or more files.
#[derive(Debug, Default)]
pub(crate) struct ReplaceResult {
    /// Every file that was processed, in lexical order.
    pub(crate) processed: Vec<Utf8PathBuf>,
    /// The new contents of every file that changed.
    pub(crate) modified: BTreeMap<Utf8PathBuf, String>,
}

/// The outcome of a listing over one or more files.
#[derive(Debug, Default)]
pub(crate) struct ListResult {
    pub(crate) processed: Vec<Utf8PathBuf>,
    /// De-duplicated references, sorted by name.
    pub(crate) entities: Vec<EntityReference>,
}

#[derive(Copy, Clone, Debug)]
enum CacheMode {
    Shared,
    Local,
    Disabled,
}

/// Configures a [`Replacer`] before its parser is shared between tasks.
pub(crate) struct ReplacerBuilder<P> {
    parser: P,
    cache: CacheMode,
    concurrency: usize,
    collect: CollectionMode,
}

impl<P: Parser + 'static> ReplacerBuilder<P> {
    fn new(parser: P) -> Self {
        Self {
            parser,
            cache: CacheMode::Shared,
            concurrency: DEFAULT_CONCURRENCY,
            collect: CollectionMode::default(),
        }
    }

    /// Replaces the parser's matching pattern, if `pattern` is given.
    pub(crate) fn with_user_regex(mut self, pattern: Option<&str>) -> Result<Self, regex::Error> {
        if let Some(pattern) = pattern {
            self.parser.set_regex(pattern)?;
        }
        Ok(self)
    }

    /// Resolves every occurrence of a reference, even repeated ones.
    pub(crate) fn with_cache_disabled(mut self) -> Self {
        self.cache = CacheMode::Disabled;
        self
    }

    /// Uses a single-owner cache, for runs that never fan out.
    pub(crate) fn with_local_cache(mut self) -> Self {
        if !matches!(self.cache, CacheMode::Disabled) {
            self.cache = CacheMode::Local;
        }
        self
    }

    pub(crate) fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub(crate) fn with_collection_mode(mut self, collect: CollectionMode) -> Self {
        self.collect = collect;
        self
    }

    pub(crate) fn build(mut self) -> Replacer {
        let cache: Option<Arc<dyn RefCache>> = match self.cache {
            CacheMode::Shared => Some(Arc::new(SharedCache::new())),
            CacheMode::Local => Some(Arc::new(LocalCache::new())),
            CacheMode::Disabled => None,
        };
        self.parser.set_cache(cache);

        Replacer {
            parser: Arc::new(self.parser),
            concurrency: self.concurrency,
            collect: self.collect,
        }
    }
}

/// Drives a [`Parser`] over strings, files and directory trees.
pub(crate) struct Replacer {
    parser: Arc<dyn Parser>,
    concurrency: usize,
    collect: CollectionMode,
}

impl Replacer {
    /// A replacer for GitHub Actions `uses:` references.
    pub(crate) fn actions(
        config: Arc<Config>,
        rest: Arc<dyn RestClient>,
        registry: Arc<dyn ImageRegistry>,
    ) -> ReplacerBuilder<ActionsParser> {
        ReplacerBuilder::new(ActionsParser::new(config, rest, registry))
    }

    /// A replacer for container image references.
    pub(crate) fn images(
        config: Arc<Config>,
        registry: Arc<dyn ImageRegistry>,
    ) -> ReplacerBuilder<ImageParser> {
        ReplacerBuilder::new(ImageParser::new(config, registry))
    }

    /// Renders a resolved reference the way it would appear in a file.
    pub(crate) fn render(&self, entity: &EntityReference) -> String {
        self.parser.render(entity)
    }

    /// Resolves a single reference literal.
    ///
    /// Unlike file rewrites, malformed input is an error here.
    pub(crate) async fn parse_string(
        &self,
        reference: &str,
    ) -> Result<EntityReference, ResolveError> {
        self.parser.replace(reference).await
    }

    /// Rewrites `content`, returning the new content if anything changed.
    pub(crate) async fn parse_content(
        &self,
        content: &str,
    ) -> Result<Option<String>, ResolveError> {
        replace_in_content(self.parser.as_ref(), content).await
    }

    /// Rewrites the file at `path` without writing it back.
    pub(crate) async fn parse_file(&self, path: &Utf8Path) -> Result<Option<String>, ReplacerError> {
        let content = read(path).await?;

        self.parse_content(&content)
            .await
            .map_err(|source| ReplacerError::File {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Rewrites every candidate file under `path`.
    ///
    /// Files are processed concurrently and share one cache. The first
    /// failure fails the whole run, once every other file has finished.
    #[instrument(skip(self))]
    pub(crate) async fn parse_path(&self, path: &Utf8Path) -> Result<ReplaceResult, ReplacerError> {
        let files = collect_files(path, self.collect)?;

        let span = info_span!("pin");
        span.pb_set_length(files.len() as u64);
        if let Ok(style) =
            ProgressStyle::with_template("[{elapsed_precise}] {bar:!30.cyan/blue} {msg}")
        {
            span.pb_set_style(&style);
        }

        self.replace_all(files).instrument(span).await
    }

    async fn replace_all(&self, files: Vec<Utf8PathBuf>) -> Result<ReplaceResult, ReplacerError> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for file in files {
            let permit = semaphore.clone().acquire_owned().await?;
            let parser = self.parser.clone();

            tasks.spawn(
                async move {
                    let result = replace_in_file(parser.as_ref(), &file).await;
                    drop(permit);
                    (file, result)
                }
                .instrument(Span::current()),
            );
        }

        let mut result = ReplaceResult::default();
        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            Span::current().pb_inc(1);

            match joined {
                Ok((file, Ok(modified))) => {
                    Span::current().pb_set_message(file.as_str());
                    if let Some(content) = modified {
                        tracing::debug!("{file} has unpinned references");
                        result.modified.insert(file.clone(), content);
                    }
                    result.processed.push(file);
                }
                Ok((_, Err(err))) => {
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(err.into());
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        result.processed.sort();
        Ok(result)
    }

    /// Lists the references in the file at `path`, without resolving them.
    pub(crate) async fn list_file(
        &self,
        path: &Utf8Path,
    ) -> Result<BTreeSet<EntityReference>, ReplacerError> {
        let content = read(path).await?;
        Ok(list_in_content(self.parser.as_ref(), &content))
    }

    /// Lists the references in every candidate file under `path`.
    #[instrument(skip(self))]
    pub(crate) async fn list_path(&self, path: &Utf8Path) -> Result<ListResult, ReplacerError> {
        let files = collect_files(path, self.collect)?;

        let entities = stream::iter(&files)
            .map(|file| self.list_file(file))
            .buffered(self.concurrency)
            .try_fold(BTreeSet::new(), |mut entities, found| async move {
                entities.extend(found);
                Ok(entities)
            })
            .await?;

        Ok(ListResult {
            processed: files,
            entities: entities.into_iter().collect(),
        })
    }
}

async fn read(path: &Utf8Path) -> Result<String, ReplacerError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ReplacerError::Read {
            path: path.to_path_buf(),
            source,
        })
}

async fn replace_in_file(
    parser: &dyn Parser,
    path: &Utf8Path,
) -> Result<Option<String>, ReplacerError> {
    let content = read(path).await?;

    replace_in_content(parser, &content)
        .await
        .map_err(|source| ReplacerError::File {
            path: path.to_path_buf(),
            source,
        })
}

/// Splits `line` into its body and its terminator (`\n`, `\r\n` or nothing).
fn split_terminator(line: &str) -> (&str, &str) {
    let body = line
        .strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line);
    line.split_at(body.len())
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

async fn replace_in_content(
    parser: &dyn Parser,
    content: &str,
) -> Result<Option<String>, ResolveError> {
    let mut output = String::with_capacity(content.len());
    let mut modified = false;

    for line in content.split_inclusive('\n') {
        let (body, terminator) = split_terminator(line);
        if is_comment(body) {
            output.push_str(line);
            continue;
        }

        // Collected up front, since resolution awaits between matches.
        let spans = parser
            .regex()
            .find_iter(body)
            .map(|m| m.range())
            .collect::<Vec<_>>();
        if spans.is_empty() {
            output.push_str(line);
            continue;
        }

        let mut new_line = String::with_capacity(line.len());
        let mut last = 0;
        for span in spans {
            new_line.push_str(&body[last..span.start]);

            let matched = &body[span.clone()];
            match parser.replace(matched).await {
                Ok(entity) => new_line.push_str(&parser.render(&entity)),
                Err(err) if err.is_skip() => {
                    tracing::debug!("{err}");
                    new_line.push_str(matched);
                }
                Err(err) if err.is_malformed() => {
                    tracing::warn!("leaving `{matched}` as-is: {err}");
                    new_line.push_str(matched);
                }
                Err(err) => return Err(err),
            }

            last = span.end;
        }
        new_line.push_str(&body[last..]);
        new_line.push_str(terminator);

        modified |= new_line != line;
        output.push_str(&new_line);
    }

    Ok(modified.then_some(output))
}

fn list_in_content(parser: &dyn Parser, content: &str) -> BTreeSet<EntityReference> {
    content
        .lines()
        .filter(|line| !is_comment(line))
        .flat_map(|line| parser.regex().find_iter(line))
        .filter_map(|m| match parser.convert_to_entity_ref(m.as_str()) {
            Ok(entity) => Some(entity),
            Err(err) => {
                tracing::debug!("not listing `{matched}`: {err}", matched = m.as_str());
                None
            }
        })
        .collect()
}
