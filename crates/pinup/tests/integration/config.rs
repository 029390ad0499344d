//! Configuration discovery tests.

use crate::common::{OutputMode, input_under_test, pinup};

/// `config-scenario/.pinup.yml` excludes everything `ci.yml` references,
/// so nothing is resolved.
#[test]
fn test_discovers_config_in_working_dir() -> anyhow::Result<()> {
    insta::assert_snapshot!(
        pinup()
            .subcommand(["actions"])
            .args(["-q", "--error"])
            .discover_config()
            .working_dir(input_under_test("config-scenario"))
            .input(input_under_test("config-scenario/ci.yml"))
            .output(OutputMode::Stderr)
            .run()?,
        @"All references are pinned. (1 file checked)"
    );

    Ok(())
}

#[test]
fn test_explicit_config() -> anyhow::Result<()> {
    insta::assert_snapshot!(
        pinup()
            .subcommand(["actions"])
            .args(["-q"])
            .config(input_under_test("config-scenario/.pinup.yml"))
            .input(input_under_test("config-scenario/ci.yml"))
            .output(OutputMode::Stderr)
            .run()?,
        @"All references are pinned. (1 file checked)"
    );

    Ok(())
}

#[test]
fn test_invalid_config() -> anyhow::Result<()> {
    let output = pinup()
        .subcommand(["image"])
        .args(["alpine:3.19"])
        .config(input_under_test("bad-config.yml"))
        .expects_code(1)
        .run()?;

    assert!(output.contains("failed to load config"), "{output}");
    assert!(output.contains("@@CONFIG@@"), "{output}");

    Ok(())
}

#[test]
fn test_no_config_conflicts_with_config() -> anyhow::Result<()> {
    let output = pinup()
        .subcommand(["image"])
        .args(["--no-config", "scratch"])
        .config(input_under_test("bad-config.yml"))
        .expects_code(2)
        .run()?;

    assert!(output.contains("cannot be used with"), "{output}");

    Ok(())
}
