use anyhow::Result;
use camino::Utf8PathBuf;
use std::{env::current_dir, sync::LazyLock};

use assert_cmd::{Command, cargo};

static TEST_PREFIX: LazyLock<Utf8PathBuf> = LazyLock::new(|| {
    let current_dir = current_dir().expect("Cannot figure out current directory");

    let file_path = current_dir
        .join("tests")
        .join("integration")
        .join("test-data");

    if !file_path.exists() {
        panic!("Cannot find test data directory: {}", file_path.display());
    }

    Utf8PathBuf::try_from(file_path).expect("Cannot create UTF-8 path from test data directory")
});

pub fn input_under_test(name: &str) -> String {
    let file_path = TEST_PREFIX.join(name);

    if !file_path.exists() {
        panic!("Cannot find input under test: {file_path}");
    }

    file_path.to_string()
}

pub enum OutputMode {
    Stdout,
    Stderr,
    Both,
}

pub struct Pinup {
    cmd: Command,
    subcommand: Vec<String>,
    args: Vec<String>,
    inputs: Vec<String>,
    config: Option<String>,
    no_config: bool,
    output: OutputMode,
    expected_code: i32,
}

impl Pinup {
    /// Create a new pinup runner.
    pub fn new() -> Self {
        let mut cmd = Command::new(cargo::cargo_bin!());

        // Our child `pinup` process starts with a clean environment, to
        // ensure we explicitly test interactions with things like
        // `GITHUB_TOKEN` and `NO_COLOR`.
        cmd.env_clear();

        Self {
            cmd,
            subcommand: vec![],
            args: vec![],
            inputs: vec![],
            config: None,
            no_config: true,
            output: OutputMode::Stdout,
            expected_code: 0,
        }
    }

    /// The subcommand to run, e.g. `["actions"]` or `["image", "list"]`.
    pub fn subcommand<'a>(mut self, args: impl IntoIterator<Item = &'a str>) -> Self {
        self.subcommand = args.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments passed after the subcommand.
    pub fn args<'a>(mut self, args: impl IntoIterator<Item = &'a str>) -> Self {
        self.args.extend(args.into_iter().map(String::from));
        self
    }

    pub fn setenv(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    pub fn config(mut self, config: impl Into<String>) -> Self {
        self.config = Some(config.into());
        self.no_config = false;
        self
    }

    /// Let `pinup` discover its configuration from the working directory.
    pub fn discover_config(mut self) -> Self {
        self.no_config = false;
        self
    }

    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn expects_code(mut self, code: i32) -> Self {
        if code != 0 {
            self = self.output(OutputMode::Both);
        }
        self.expected_code = code;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.cmd.current_dir(dir.into());
        self
    }

    pub fn run(mut self) -> Result<String> {
        self.cmd.args(&self.subcommand);
        self.cmd.args(&self.args);

        // NOTE: progress bars need a terminal, and tests never have one.
        self.cmd.arg("--no-progress");

        if self.no_config {
            self.cmd.arg("--no-config");
        }

        if let Some(config) = &self.config {
            self.cmd.arg("--config").arg(config);
        }

        for input in &self.inputs {
            self.cmd.arg(input);
        }

        let output = self.cmd.output()?;

        let mut raw = String::from_utf8(match self.output {
            OutputMode::Stdout => output.stdout,
            OutputMode::Stderr => output.stderr,
            OutputMode::Both => [output.stderr, output.stdout].concat(),
        })?;

        let exit_code = output.status.code();
        if exit_code != Some(self.expected_code) {
            anyhow::bail!("pinup exited with unexpected code {exit_code:?}: {raw}");
        }

        let config_placeholder = "@@CONFIG@@";
        if let Some(config) = &self.config {
            raw = raw.replace(config, config_placeholder);
        }

        let input_placeholder = "@@INPUT@@";
        for input in &self.inputs {
            raw = raw.replace(input, input_placeholder);
        }

        // Fallback: replace any lingering absolute paths.
        let test_prefix_placeholder = "@@TEST_PREFIX@@";
        raw = raw.replace(TEST_PREFIX.as_str(), test_prefix_placeholder);

        let version_placeholder = "@@VERSION@@";
        raw = raw.replace(env!("CARGO_PKG_VERSION"), version_placeholder);

        Ok(raw)
    }
}

pub fn pinup() -> Pinup {
    Pinup::new()
}
