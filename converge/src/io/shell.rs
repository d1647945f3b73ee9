//! Command runner abstraction for resource actions and command guards.
//!
//! The [`CommandRunner`] trait is the only way resources reach external
//! processes. Tests use scripted runners that return predetermined exit codes
//! without spawning anything.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, instrument};

use crate::io::process::{CommandOutput, run_command_with_timeout};

pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1_000_000;

/// A shell command line plus the process settings to run it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    /// Extra `PATH` entries, prepended to the inherited search path.
    pub path: Vec<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub umask: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            environment: BTreeMap::new(),
            path: Vec::new(),
            user: None,
            group: None,
            umask: None,
            timeout,
        }
    }
}

/// Abstraction over "run an external command, get its exit status".
pub trait CommandRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runner that hands the command line to the platform shell.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    output_limit_bytes: usize,
}

impl ShellCommandRunner {
    pub fn new(output_limit_bytes: usize) -> Self {
        Self { output_limit_bytes }
    }
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT_BYTES)
    }
}

impl CommandRunner for ShellCommandRunner {
    #[instrument(skip_all, fields(command = %spec.command))]
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let cmd = build_command(spec)?;
        debug!(cwd = ?spec.cwd, user = ?spec.user, "running shell command");
        run_command_with_timeout(cmd, spec.timeout, self.output_limit_bytes)
    }
}

#[cfg(unix)]
fn build_command(spec: &CommandSpec) -> Result<Command> {
    use std::os::unix::process::CommandExt;

    let line = match &spec.umask {
        Some(umask) => format!("umask {umask} && {}", spec.command),
        None => spec.command.clone(),
    };
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    apply_common(&mut cmd, spec, ":");

    if let Some(user) = &spec.user {
        match user.parse::<u32>() {
            Ok(uid) => {
                cmd.uid(uid);
            }
            Err(_) => bail!("user {user} must be a numeric uid"),
        }
    }
    if let Some(group) = &spec.group {
        match group.parse::<u32>() {
            Ok(gid) => {
                cmd.gid(gid);
            }
            Err(_) => bail!("group {group} must be a numeric gid"),
        }
    }
    Ok(cmd)
}

#[cfg(windows)]
fn build_command(spec: &CommandSpec) -> Result<Command> {
    if spec.user.is_some() || spec.group.is_some() {
        bail!("user and group are not supported on windows");
    }
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(&spec.command);
    apply_common(&mut cmd, spec, ";");
    Ok(cmd)
}

fn apply_common(cmd: &mut Command, spec: &CommandSpec, separator: &str) {
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    cmd.envs(&spec.environment);
    if !spec.path.is_empty() {
        let mut search = spec.path.join(separator);
        if let Ok(inherited) = std::env::var("PATH") {
            search.push_str(separator);
            search.push_str(&inherited);
        }
        cmd.env("PATH", search);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spec(command: &str) -> CommandSpec {
        CommandSpec::new(command, Duration::from_secs(10))
    }

    #[test]
    fn runs_in_cwd_with_environment() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut spec = spec("test \"$(pwd)\" = \"$EXPECTED\"");
        spec.cwd = Some(temp.path().to_path_buf());
        let expected = temp.path().canonicalize().expect("canonicalize");
        spec.environment
            .insert("EXPECTED".to_string(), expected.display().to_string());

        let output = ShellCommandRunner::default().run(&spec).expect("run");
        assert!(output.success(), "stderr: {}", output.stderr_tail(5));
    }

    #[test]
    fn applies_umask_before_command() {
        let mut spec = spec("test \"$(umask)\" = 0027");
        spec.umask = Some("0027".to_string());
        let output = ShellCommandRunner::default().run(&spec).expect("run");
        assert!(output.success());
    }

    #[test]
    fn rejects_named_user() {
        let mut spec = spec("true");
        spec.user = Some("alice".to_string());
        let err = ShellCommandRunner::default().run(&spec).unwrap_err();
        assert!(err.to_string().contains("numeric uid"));
    }
}
