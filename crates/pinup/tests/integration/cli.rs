use assert_cmd::{Command, cargo};

use crate::common::{OutputMode, pinup};

/// A single commit-pinned reference is already pinned, so it's echoed back.
#[test]
fn test_single_pinned_action() -> anyhow::Result<()> {
    insta::assert_snapshot!(
        pinup()
            .subcommand(["actions"])
            .args(["actions/checkout@b4ffde65f46336ab88eb53be808477a3936bae11"])
            .run()?,
        @"actions/checkout@b4ffde65f46336ab88eb53be808477a3936bae11"
    );

    Ok(())
}

#[test]
fn test_single_local_action() -> anyhow::Result<()> {
    insta::assert_snapshot!(
        pinup()
            .subcommand(["ghactions"])
            .args(["./.github/actions/setup"])
            .run()?,
        @"./.github/actions/setup"
    );

    Ok(())
}

#[test]
fn test_single_excluded_images() -> anyhow::Result<()> {
    for image in ["scratch", "alpine", "nginx:latest"] {
        assert_eq!(
            pinup().subcommand(["image"]).args([image]).run()?.trim_end(),
            image
        );
    }

    // Aliases behave the same.
    for alias in ["containerimage", "compose"] {
        assert_eq!(
            pinup().subcommand([alias]).args(["scratch"]).run()?.trim_end(),
            "scratch"
        );
    }

    Ok(())
}

#[test]
fn test_single_malformed_action() -> anyhow::Result<()> {
    let output = pinup()
        .subcommand(["actions"])
        .args(["actions@v4"])
        .expects_code(1)
        .run()?;

    assert!(output.contains("fatal: no references were pinned"), "{output}");
    assert!(output.contains("couldn't pin actions@v4"), "{output}");

    Ok(())
}

#[test]
fn test_invalid_platform() -> anyhow::Result<()> {
    let output = pinup()
        .subcommand(["image"])
        .args(["--platform", "linux", "alpine:3.19"])
        .expects_code(2)
        .run()?;

    assert!(output.contains("invalid value 'linux'"), "{output}");

    Ok(())
}

#[test]
fn test_invalid_regex() -> anyhow::Result<()> {
    let output = pinup()
        .subcommand(["image"])
        .args(["--regex", "image: ("])
        .input(crate::common::input_under_test("pinned"))
        .expects_code(1)
        .run()?;

    assert!(output.contains("invalid --regex"), "{output}");

    Ok(())
}

#[test]
fn test_no_command() -> anyhow::Result<()> {
    let output = Command::new(cargo::cargo_bin!())
        .env_clear()
        .output()?;

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8(output.stderr)?.contains("Usage: pinup"));

    Ok(())
}

#[test]
fn test_completions() -> anyhow::Result<()> {
    let output = Command::new(cargo::cargo_bin!())
        .env_clear()
        .args(["--completions", "bash"])
        .output()?;

    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)?.contains("_pinup()"));

    Ok(())
}

#[test]
fn test_version() -> anyhow::Result<()> {
    let output = Command::new(cargo::cargo_bin!())
        .env_clear()
        .arg("--version")
        .output()?;

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout)?.trim_end(),
        concat!("pinup ", env!("CARGO_PKG_VERSION"))
    );

    Ok(())
}

/// Diagnostics never go to stdout.
#[test]
fn test_skip_logs_to_stderr() -> anyhow::Result<()> {
    let stderr = pinup()
        .subcommand(["image"])
        .args(["scratch"])
        .output(OutputMode::Stderr)
        .run()?;

    assert!(stderr.contains("skipped"), "{stderr}");

    Ok(())
}
