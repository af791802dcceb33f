//! Test running the `launchpad` binary

use anyhow::bail;
use std::io;
use std::process::{Command, Output};
use std::{env, str};
use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_launchpad");

/// Returns the stdout lines of the successful process
fn handle_output(output: io::Result<Output>) -> anyhow::Result<Vec<String>> {
    match output {
        Ok(output) => {
            if !output.status.success() {
                bail!(
                    "Command failed: {}\n---stdout:\n{}\n---stderr:\n{}",
                    output.status,
                    String::from_utf8_lossy(&output.stdout),
                    String::from_utf8_lossy(&output.stderr)
                );
            }
            let stdout = str::from_utf8(&output.stdout)?;
            Ok(stdout.lines().map(ToString::to_string).collect())
        }
        Err(err) => Err(err.into()),
    }
}

fn isolated_home() -> TempDir {
    TempDir::new().unwrap()
}

#[test]
fn test_find_project_root_walks_upward_to_inferred_manifest() {
    let project = TempDir::new().unwrap();
    fs_err::write(project.path().join("package.json"), "{}").unwrap();
    let nested = project.path().join("src").join("lib");
    fs_err::create_dir_all(&nested).unwrap();

    let output = Command::new(BIN)
        .args(["dev:find-project-root", nested.to_str().unwrap()])
        .output();
    let lines = handle_output(output).unwrap();
    assert_eq!(lines, vec![project.path().to_string_lossy().to_string()]);
}

#[test]
fn test_find_project_root_reports_failure_when_none_found() {
    let empty = TempDir::new().unwrap();
    let output = Command::new(BIN)
        .args(["dev:find-project-root", empty.path().to_str().unwrap()])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no recognized manifest"));
}

#[test]
fn test_dev_md5_agrees_between_file_and_stdin() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("sample.txt");
    fs_err::write(&file, b"hello world").unwrap();

    let from_file = handle_output(Command::new(BIN).args(["dev:md5", file.to_str().unwrap()]).output()).unwrap();

    let mut child = Command::new(BIN)
        .args(["dev:md5", "-"])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    use std::io::Write;
    child.stdin.take().unwrap().write_all(b"hello world").unwrap();
    let from_stdin = handle_output(child.wait_with_output()).unwrap();

    assert_eq!(from_file, from_stdin);
    assert_eq!(from_file[0].len(), 8);
}

#[test]
fn test_cache_clear_is_idempotent_on_an_already_clean_cache() {
    let home = isolated_home();
    let output = Command::new(BIN)
        .arg("cache:clear")
        .env("LAUNCHPAD_TEST_HOME", home.path())
        .output();
    handle_output(output).unwrap();

    // Running it again with nothing to remove must still succeed.
    let output = Command::new(BIN)
        .arg("cache:clear")
        .env("LAUNCHPAD_TEST_HOME", home.path())
        .output();
    handle_output(output).unwrap();
}

/// A project with no recognized manifest sniffs to zero requirements, so
/// `dev:dump` never touches the network and always emits activation code
/// exporting the project's own env vars (scenario seed #6's shape, minus a
/// global-stub fallback since nothing gets installed at all).
#[test]
fn test_dev_dump_emits_activation_code_for_a_manifest_free_project() {
    let project = TempDir::new().unwrap();
    let home = isolated_home();

    let output = Command::new(BIN)
        .args(["dev:dump", project.path().to_str().unwrap()])
        .env("LAUNCHPAD_TEST_HOME", home.path())
        .output();
    let lines = handle_output(output).unwrap();
    let rendered = lines.join("\n");
    assert!(rendered.contains("LAUNCHPAD_PROJECT_DIR"));
    assert!(rendered.contains("LAUNCHPAD_PROJECT_HASH"));
    assert!(rendered.contains("_launchpad_chpwd_hook"));
}

#[test]
fn test_dev_dump_respects_disabled_shell_integration() {
    let project = TempDir::new().unwrap();
    let home = isolated_home();

    let output = Command::new(BIN)
        .args(["dev:dump", project.path().to_str().unwrap()])
        .env("LAUNCHPAD_TEST_HOME", home.path())
        .env("LAUNCHPAD_DISABLE_SHELL_INTEGRATION", "1")
        .output();
    let lines = handle_output(output).unwrap();
    let rendered = lines.join("\n");
    assert!(!rendered.contains("_launchpad_chpwd_hook"));
}
