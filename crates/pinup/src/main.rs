#![warn(clippy::all, clippy::dbg_macro)]

use std::{
    io::{Write, stdout},
    process::ExitCode,
    sync::Arc,
};

use annotate_snippets::{Group, Level, Renderer};
use anstream::{eprintln, println, stream::IsTerminal};
use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Generator;
use clap_verbosity_flag::InfoLevel;
use collect::CollectionMode;
use config::Config;
use github::{GitHubHost, GitHubToken};
use oci_registry::{OciRegistryClient, Platform};
use output::ListFormat;
use owo_colors::OwoColorize;
use replacer::{DEFAULT_CONCURRENCY, ReplaceResult, Replacer, ReplacerBuilder};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod cache;
mod collect;
mod config;
mod github;
mod models;
mod oci_registry;
mod output;
mod parser;
mod replacer;
mod resolve;
#[cfg(test)]
mod testing;
mod utils;

#[cfg(not(any(target_family = "windows", target_os = "openbsd")))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// The exit code used with `--error` when files were (or would be) modified.
const MODIFIED_EXIT_CODE: u8 = 11;

/// Pins GitHub Actions and container images to immutable references.
#[derive(Parser)]
#[command(about, version, arg_required_else_help = true)]
struct App {
    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<InfoLevel>,

    /// Don't show progress bars, even if the terminal supports them.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Control the use of color in output.
    #[arg(long, value_enum, value_name = "MODE", global = true)]
    color: Option<ColorMode>,

    /// Generate tab completion scripts for the specified shell.
    #[arg(long, value_enum, value_name = "SHELL", exclusive = true)]
    completions: Option<Shell>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Pin GitHub Actions references to commit SHAs.
    ///
    /// Tags and branches in `uses:` clauses are replaced by the commit
    /// they currently point to, keeping the tag as a trailing comment.
    ///
    /// GitHub rate-limits anonymous API calls heavily; set GITHUB_TOKEN
    /// to raise the limit.
    #[command(visible_alias = "ghactions", args_conflicts_with_subcommands = true)]
    Actions {
        /// A workflow file, a directory, or a single `owner/repo@ref`
        /// reference.
        #[arg(default_value = ".github/workflows")]
        input: String,

        #[command(flatten)]
        options: PinOptions,

        #[command(subcommand)]
        list: Option<ListCommand>,
    },

    /// Pin container image references to digests.
    ///
    /// Handles `image:` keys in YAML files (Compose files, Kubernetes
    /// manifests, workflows) and `FROM` instructions in Dockerfiles.
    #[command(
        visible_aliases = ["containerimage", "compose"],
        args_conflicts_with_subcommands = true
    )]
    Image {
        /// A file, a directory, or a single image reference.
        #[arg(default_value = ".")]
        input: String,

        #[command(flatten)]
        options: PinOptions,

        #[command(subcommand)]
        list: Option<ListCommand>,
    },
}

#[derive(Subcommand)]
enum ListCommand {
    /// List references without resolving them.
    List {
        /// A file or directory to scan.
        path: Utf8PathBuf,

        /// The output format.
        #[arg(short, long, value_enum, default_value_t)]
        format: ListFormat,
    },
}

#[derive(Args)]
struct PinOptions {
    /// Don't modify files; print their pinned contents instead.
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Exit with code 11 if any file was (or would be) modified.
    #[arg(short, long, global = true)]
    error: bool,

    /// A custom regular expression to match references with.
    #[arg(short, long, global = true)]
    regex: Option<String>,

    /// The platform to resolve image digests for, e.g. `linux/amd64`.
    ///
    /// Overrides the configured platform.
    #[arg(short, long, global = true)]
    platform: Option<Platform>,

    /// The configuration file to load. By default, any config will be
    /// discovered relative to $CWD.
    #[arg(short, long, env = "PINUP_CONFIG", global = true)]
    config: Option<Utf8PathBuf>,

    /// Disable all configuration loading.
    #[arg(long, global = true, conflicts_with = "config")]
    no_config: bool,

    /// The GitHub API token to use.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    gh_token: Option<String>,

    /// The GitHub Server Hostname. Defaults to github.com
    #[arg(long, env = "GH_HOST", default_value = "github.com", global = true)]
    gh_hostname: GitHubHost,

    /// Control which files are collected from directories.
    ///
    /// By default, `.gitignore` files are honored.
    #[arg(long, value_enum, default_value_t, global = true)]
    collect: CollectionMode,

    /// The number of files to process concurrently.
    #[arg(short, long, default_value_t = DEFAULT_CONCURRENCY, global = true)]
    jobs: usize,

    /// Resolve every occurrence of a reference, without caching.
    #[arg(long, global = true)]
    no_cache: bool,
}

/// Shell with auto-generated completion script available.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, ValueEnum)]
#[allow(clippy::enum_variant_names)]
enum Shell {
    /// Bourne Again `SHell` (bash)
    Bash,
    /// Elvish shell
    Elvish,
    /// Friendly Interactive `SHell` (fish)
    Fish,
    /// Nushell
    Nushell,
    /// `PowerShell`
    Powershell,
    /// Z `SHell` (zsh)
    Zsh,
}

impl Generator for Shell {
    fn file_name(&self, name: &str) -> String {
        match self {
            Shell::Bash => clap_complete::shells::Bash.file_name(name),
            Shell::Elvish => clap_complete::shells::Elvish.file_name(name),
            Shell::Fish => clap_complete::shells::Fish.file_name(name),
            Shell::Nushell => clap_complete_nushell::Nushell.file_name(name),
            Shell::Powershell => clap_complete::shells::PowerShell.file_name(name),
            Shell::Zsh => clap_complete::shells::Zsh.file_name(name),
        }
    }

    fn generate(&self, cmd: &clap::Command, buf: &mut dyn std::io::Write) {
        match self {
            Shell::Bash => clap_complete::shells::Bash.generate(cmd, buf),
            Shell::Elvish => clap_complete::shells::Elvish.generate(cmd, buf),
            Shell::Fish => clap_complete::shells::Fish.generate(cmd, buf),
            Shell::Nushell => clap_complete_nushell::Nushell.generate(cmd, buf),
            Shell::Powershell => clap_complete::shells::PowerShell.generate(cmd, buf),
            Shell::Zsh => clap_complete::shells::Zsh.generate(cmd, buf),
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub(crate) enum ColorMode {
    /// Use color output if the output supports it.
    Auto,
    /// Force color output, even if the output isn't a terminal.
    Always,
    /// Disable color output, even if the output is a compatible terminal.
    Never,
}

impl ColorMode {
    /// Returns a concrete (i.e. non-auto) `anstream::ColorChoice` for the given terminal.
    ///
    /// `anstream::AutoStream` can't infer this through a `Box<dyn Write>`.
    fn color_choice_for_terminal(&self, io: impl IsTerminal) -> anstream::ColorChoice {
        match self {
            ColorMode::Auto => {
                if io.is_terminal() {
                    anstream::ColorChoice::Always
                } else {
                    anstream::ColorChoice::Never
                }
            }
            ColorMode::Always => anstream::ColorChoice::Always,
            ColorMode::Never => anstream::ColorChoice::Never,
        }
    }
}

impl From<ColorMode> for anstream::ColorChoice {
    fn from(value: ColorMode) -> Self {
        match value {
            ColorMode::Auto => Self::Auto,
            ColorMode::Always => Self::Always,
            ColorMode::Never => Self::Never,
        }
    }
}

pub(crate) fn tips(err: impl AsRef<str>, tips: &[impl AsRef<str>]) -> String {
    let mut group = Group::with_title(Level::ERROR.primary_title(err.as_ref()));
    for tip in tips {
        group = group.element(Level::NOTE.message(tip.as_ref()));
    }

    let renderer = Renderer::styled();
    format!("{}", renderer.render(&[group]))
}

fn completions<G: clap_complete::Generator>(generator: G, cmd: &mut clap::Command) {
    clap_complete::generate(
        generator,
        cmd,
        cmd.get_name().to_string(),
        &mut std::io::stdout(),
    );
}

fn load_config(options: &PinOptions) -> Result<Arc<Config>> {
    let config = Config::discover(
        options.no_config,
        options.config.as_deref(),
        Utf8Path::new("."),
    )
    .map_err(|e| {
        anyhow!(tips(
            format!("failed to load config: {e:#}"),
            &["check your configuration file for errors"]
        ))
    })?;

    Ok(Arc::new(config.with_platform(options.platform.as_ref())))
}

fn github_client(options: &PinOptions) -> Result<github::Client> {
    let token = options
        .gh_token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .map(GitHubToken::new)
        .transpose()
        .map_err(|e| {
            anyhow!(tips(
                format!("invalid GitHub token: {e}"),
                &["check --gh-token or GITHUB_TOKEN"]
            ))
        })?;

    if token.is_none() {
        tracing::debug!("no GitHub token; API calls are anonymous");
    }

    github::Client::new(&options.gh_hostname, token.as_ref())
        .context("failed to build the GitHub API client")
}

/// Resolves, rewrites or lists `input` with the replacer `builder` configures.
async fn pin<P: parser::Parser + 'static>(
    builder: ReplacerBuilder<P>,
    input: &str,
    options: &PinOptions,
    list: Option<ListCommand>,
) -> Result<ExitCode> {
    let builder = builder
        .with_user_regex(options.regex.as_deref())
        .map_err(|e| {
            anyhow!(tips(
                format!("invalid --regex: {e}"),
                &["the pattern must be a valid Rust regular expression"]
            ))
        })?
        .with_concurrency(options.jobs)
        .with_collection_mode(options.collect);
    let builder = if options.no_cache {
        builder.with_cache_disabled()
    } else {
        builder
    };

    if let Some(ListCommand::List { path, format }) = list {
        let result = builder
            .build()
            .list_path(&path)
            .await
            .with_context(|| format!("couldn't list references in {path}"))?;

        tracing::debug!("scanned {} files", result.processed.len());
        match format {
            ListFormat::Table => output::plain::render_entities(&result.entities),
            ListFormat::Json => output::json::output(stdout().lock(), &result.entities)?,
        }

        return Ok(ExitCode::SUCCESS);
    }

    let path = Utf8Path::new(input);
    let result = if path.is_file() {
        let replacer = builder.with_local_cache().build();
        let mut result = ReplaceResult {
            processed: vec![path.to_path_buf()],
            ..Default::default()
        };
        if let Some(content) = replacer.parse_file(path).await.map_err(resolution_failed)? {
            result.modified.insert(path.to_path_buf(), content);
        }
        result
    } else if path.is_dir() {
        builder
            .build()
            .parse_path(path)
            .await
            .map_err(resolution_failed)?
    } else {
        // Anything that isn't on disk is a single reference.
        let replacer = builder.with_local_cache().build();
        match replacer.parse_string(input).await {
            Ok(entity) => println!("{}", replacer.render(&entity)),
            Err(err) if err.is_skip() => {
                tracing::info!("{err}");
                println!("{input}");
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(tips(
                    format!("couldn't pin {input}"),
                    &[
                        "pass an existing file or directory, or a single reference",
                        "set GITHUB_TOKEN if GitHub is rate-limiting anonymous calls",
                    ],
                )));
            }
        }
        return Ok(ExitCode::SUCCESS);
    };

    output::fix::apply_changes(&result, options.dry_run)?;

    if options.error && !result.modified.is_empty() {
        Ok(ExitCode::from(MODIFIED_EXIT_CODE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn resolution_failed(err: replacer::ReplacerError) -> anyhow::Error {
    anyhow::Error::new(err).context(tips(
        "couldn't pin references",
        &[
            "no files were written",
            "set GITHUB_TOKEN if GitHub is rate-limiting anonymous calls",
        ],
    ))
}

async fn dispatch(command: Command) -> Result<ExitCode> {
    match command {
        Command::Actions {
            input,
            options,
            list,
        } => {
            let config = load_config(&options)?;
            let rest = Arc::new(github_client(&options)?);
            let registry = Arc::new(OciRegistryClient::new());

            pin(
                Replacer::actions(config, rest, registry),
                &input,
                &options,
                list,
            )
            .await
        }
        Command::Image {
            input,
            options,
            list,
        } => {
            let config = load_config(&options)?;
            let registry = Arc::new(OciRegistryClient::new());

            pin(Replacer::images(config, registry), &input, &options, list).await
        }
    }
}

fn run() -> Result<ExitCode> {
    human_panic::setup_panic!();

    let mut app = App::parse();

    if let Some(shell) = app.completions {
        let mut cmd = App::command();
        completions(shell, &mut cmd);
        return Ok(ExitCode::SUCCESS);
    }

    let color_mode = match app.color {
        Some(color_mode) => color_mode,
        None => {
            // If `--color` wasn't specified, we first check a handful
            // of common environment variables, and then fall
            // back to `anstream`'s auto detection.
            if std::env::var("NO_COLOR").is_ok() {
                ColorMode::Never
            } else if std::env::var("FORCE_COLOR").is_ok()
                || std::env::var("CLICOLOR_FORCE").is_ok()
            {
                ColorMode::Always
            } else {
                ColorMode::Auto
            }
        }
    };

    anstream::ColorChoice::write_global(color_mode.into());

    // `anstream` strips ANSI escapes when color is off, while
    // `tracing_indicatif` needs them for line control.
    if matches!(color_mode, ColorMode::Never) {
        app.no_progress = true;
    }

    let indicatif_layer = IndicatifLayer::new();

    let writer = std::sync::Mutex::new(anstream::AutoStream::new(
        Box::new(indicatif_layer.get_stderr_writer()) as Box<dyn Write + Send>,
        color_mode.color_choice_for_terminal(std::io::stderr()),
    ));

    let filter = EnvFilter::builder()
        .with_default_directive(app.verbose.tracing_level_filter().into())
        .from_env()?;

    let reg = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                // NOTE: We don't need `with_ansi` here since our writer is
                // an `anstream::AutoStream` that handles color output for us.
                .with_writer(writer),
        )
        .with(filter);

    if app.no_progress {
        reg.init();
    } else {
        reg.with(indicatif_layer).init();
    }

    let Some(command) = app.command else {
        return Err(anyhow!(tips(
            "no command given",
            &["try `pinup actions` or `pinup image`"]
        )));
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    runtime.block_on(async {
        tokio::select! {
            result = dispatch(command) => result,
            _ = tokio::signal::ctrl_c() => Err(anyhow!(tips(
                "interrupted",
                &["no files were written"]
            ))),
        }
    })
}

fn main() -> ExitCode {
    // Returning an ExitCode (rather than calling `process::exit`) lets
    // destructors run before we exit.
    match run() {
        Ok(exit) => exit,
        Err(err) => {
            eprintln!(
                "{fatal}: no references were pinned",
                fatal = "fatal".red().bold()
            );
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}
