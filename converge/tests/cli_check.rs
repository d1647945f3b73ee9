//! CLI tests for `converge check`, `converge apply` and `converge init`.
//!
//! Spawns the converge binary against declarations whose guards are real
//! shell commands and verifies exit codes and JSON reports.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::Command;

use converge::exit_codes;
use converge::io::config::{ConvergeConfig, load_config};
use serde_json::Value;

fn declare(dir: &Path, guards: &str, command: &str) -> String {
    let contents = format!(
        r#"
[node]
name = "local"

[resource]
type = "execute"
name = "deploy"
attributes = {{ command = "{command}" }}

{guards}
"#
    );
    fs::write(dir.join("deploy.toml"), contents).expect("write declaration");
    "deploy.toml".to_string()
}

fn converge(dir: &Path, args: &[&str]) -> (Option<i32>, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_converge"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run converge");
    (
        output.status.code(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    )
}

#[test]
fn check_not_if_success_exits_skipped() {
    let temp = tempfile::tempdir().expect("tempdir");
    let declaration = declare(
        temp.path(),
        "[[guards]]\nkind = \"not_if\"\ncommand = \"true\"\n",
        "true",
    );

    let (code, stdout) = converge(temp.path(), &["check", &declaration]);
    assert_eq!(code, Some(exit_codes::SKIPPED));
    let report: Value = serde_json::from_str(&stdout).expect("json report");
    assert_eq!(report["run"], false);
    assert_eq!(report["blocked_by"], "not_if \"true\"");
}

#[test]
fn check_only_if_success_exits_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    let declaration = declare(
        temp.path(),
        "[[guards]]\nkind = \"only_if\"\ncommand = \"true\"\n",
        "true",
    );

    let (code, stdout) = converge(temp.path(), &["check", &declaration]);
    assert_eq!(code, Some(exit_codes::OK));
    let report: Value = serde_json::from_str(&stdout).expect("json report");
    assert_eq!(report["resource"], "execute[deploy]");
    assert_eq!(report["run"], true);
}

#[test]
fn apply_runs_action_when_guards_allow() {
    let temp = tempfile::tempdir().expect("tempdir");
    let declaration = declare(
        temp.path(),
        "[[guards]]\nkind = \"not_if\"\ncommand = \"test -f marker\"\n",
        "touch marker",
    );

    let (code, stdout) = converge(temp.path(), &["apply", &declaration]);
    assert_eq!(code, Some(exit_codes::OK));
    assert!(temp.path().join("marker").exists());
    let report: Value = serde_json::from_str(&stdout).expect("json report");
    assert_eq!(report["updated"], true);

    // Second run: the marker exists, so the guard skips the action.
    let (code, _) = converge(temp.path(), &["apply", &declaration]);
    assert_eq!(code, Some(exit_codes::SKIPPED));
}

#[test]
fn block_guard_with_handled_failure_skips_only_if() {
    let temp = tempfile::tempdir().expect("tempdir");
    let declaration = declare(
        temp.path(),
        r#"[[guards]]
kind = "only_if"
resource = "execute"
handled = ["shell_command_failed"]
statements = [{ set = "command", value = "false" }]
"#,
        "true",
    );

    let (code, stdout) = converge(temp.path(), &["check", &declaration]);
    assert_eq!(code, Some(exit_codes::SKIPPED));
    let report: Value = serde_json::from_str(&stdout).expect("json report");
    assert_eq!(report["blocked_by"], "only_if { execute block }");
}

#[test]
fn invalid_declaration_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("broken.toml"), "[resource]\n").expect("write");

    let (code, _) = converge(temp.path(), &["check", "broken.toml"]);
    assert_eq!(code, Some(exit_codes::INVALID));
}

#[test]
fn guard_command_prints_host_command_line() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (code, stdout) = converge(temp.path(), &["guard-command", "Test-Path C:\\app"]);
    assert_eq!(code, Some(exit_codes::OK));
    assert_eq!(
        stdout.trim_end(),
        "powershell.exe -NoLogo -NonInteractive -NoProfile -ExecutionPolicy RemoteSigned \
         -InputFormat None -Command Test-Path C:\\app"
    );
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (code, _) = converge(temp.path(), &["init"]);
    assert_eq!(code, Some(exit_codes::OK));

    let cfg = load_config(&temp.path().join("converge.toml")).expect("load written config");
    assert_eq!(cfg, ConvergeConfig::default());

    // An existing file is left alone without --force.
    fs::write(temp.path().join("converge.toml"), "[guard]\ntimeout_secs = 5\n").expect("write");
    let (code, _) = converge(temp.path(), &["init"]);
    assert_eq!(code, Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("converge.toml")).expect("load");
    assert_eq!(cfg.guard.timeout_secs, 5);
}
