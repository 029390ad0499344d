use std::fs;

use camino::Utf8Path;

use crate::common::{OutputMode, input_under_test, pinup};

/// Everything under `pinned/` is pinned, local, excluded or malformed,
/// so neither GitHub nor any registry is ever consulted.
#[test]
fn test_pinned_actions_directory() -> anyhow::Result<()> {
    let before = fs::read_to_string(input_under_test("pinned/.github/workflows/ci.yml"))?;

    insta::assert_snapshot!(
        pinup()
            .subcommand(["actions"])
            .args(["--error"])
            .input(input_under_test("pinned"))
            .output(OutputMode::Stderr)
            .args(["--quiet"])
            .run()?,
        @"All references are pinned. (3 files checked)"
    );

    assert_eq!(
        fs::read_to_string(input_under_test("pinned/.github/workflows/ci.yml"))?,
        before
    );

    Ok(())
}

#[test]
fn test_pinned_images_directory() -> anyhow::Result<()> {
    let output = pinup()
        .subcommand(["image"])
        .args(["--dry-run", "--quiet"])
        .input(input_under_test("pinned"))
        .output(OutputMode::Both)
        .run()?;

    // Nothing changed, so a dry run prints no contents.
    assert!(output.ends_with("All references are pinned. (3 files checked)\n"), "{output}");

    Ok(())
}

#[test]
fn test_pinned_single_file() -> anyhow::Result<()> {
    insta::assert_snapshot!(
        pinup()
            .subcommand(["image"])
            .args(["-q"])
            .input(input_under_test("pinned/Dockerfile"))
            .output(OutputMode::Stderr)
            .run()?,
        @"All references are pinned. (1 file checked)"
    );

    Ok(())
}

#[test]
fn test_malformed_reference_is_left_alone() -> anyhow::Result<()> {
    let stderr = pinup()
        .subcommand(["image"])
        .input(input_under_test("pinned/compose.yml"))
        .output(OutputMode::Stderr)
        .run()?;

    assert!(stderr.contains("leaving `image: {{` as-is"), "{stderr}");
    assert!(stderr.contains("All references are pinned."), "{stderr}");

    Ok(())
}

#[test]
fn test_gitignore_is_honored() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let root = Utf8Path::from_path(tmp.path()).expect("non-UTF-8 tempdir");

    fs::write(root.join(".gitignore"), "vendor/\n")?;
    fs::create_dir_all(root.join("vendor"))?;
    fs::write(root.join("vendor/Dockerfile"), "FROM golang:1.22.2\n")?;
    fs::write(root.join("Dockerfile"), "FROM scratch\n")?;

    let stderr = pinup()
        .subcommand(["image"])
        .args(["-q"])
        .input(root.as_str())
        .output(OutputMode::Stderr)
        .run()?;
    assert_eq!(stderr.trim_end(), "All references are pinned. (1 file checked)");

    // `--collect=all` walks into `vendor/` and lists what it finds there.
    let listed = pinup()
        .subcommand(["image", "list"])
        .args(["--collect", "all", "--format", "json"])
        .input(root.as_str())
        .run()?;
    assert!(listed.contains(r#""name": "golang""#), "{listed}");

    Ok(())
}
