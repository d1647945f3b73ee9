//! `execute` resource: run a command line and check its exit status.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::error::ActionError;
use crate::core::types::{AttrKind, AttrValue, ErrorKind};
use crate::io::shell::CommandSpec;
use crate::resource::context::RunContext;
use crate::resource::{ACTION_NOTHING, AttrSpec, Resource, ResourceBase};

pub const ACTION_RUN: &str = "run";

/// Command timeout when the `timeout` attribute is unset.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Attributes an anonymous guard resource inherits from a command resource.
pub const GUARD_INHERITED_ATTRIBUTES: &[&str] =
    &["cwd", "environment", "group", "path", "user", "umask"];

pub(crate) const ID: &[AttrKind] = &[AttrKind::Str, AttrKind::Int];

/// Schema of `execute`, followed by any type-specific attribute specs.
///
/// Command-running resources share these attributes through this macro.
macro_rules! command_schema {
    ($($extra:expr),* $(,)?) => {
        &[
            $crate::resource::AttrSpec::new("command", &[$crate::core::types::AttrKind::Str]),
            $crate::resource::AttrSpec::new("creates", &[$crate::core::types::AttrKind::Str]),
            $crate::resource::AttrSpec::new("cwd", &[$crate::core::types::AttrKind::Str]),
            $crate::resource::AttrSpec::new("environment", &[$crate::core::types::AttrKind::Map]),
            $crate::resource::AttrSpec::new("group", $crate::resource::execute::ID),
            $crate::resource::AttrSpec::new("path", &[$crate::core::types::AttrKind::List]),
            $crate::resource::AttrSpec::new(
                "returns",
                &[$crate::core::types::AttrKind::Int, $crate::core::types::AttrKind::IntList],
            ),
            $crate::resource::AttrSpec::new("timeout", &[$crate::core::types::AttrKind::Int]),
            $crate::resource::AttrSpec::new("user", $crate::resource::execute::ID),
            $crate::resource::AttrSpec::new("umask", $crate::resource::execute::ID),
            $($extra,)*
        ]
    };
}
pub(crate) use command_schema;

pub const EXECUTE_SCHEMA: &[AttrSpec] = command_schema![];

pub struct Execute {
    base: ResourceBase,
}

impl Execute {
    pub fn new(name: &str, context: Option<RunContext>) -> Self {
        Self {
            base: ResourceBase::new(name, "execute", context, ACTION_RUN),
        }
    }
}

impl Resource for Execute {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    fn schema(&self) -> &'static [AttrSpec] {
        EXECUTE_SCHEMA
    }

    fn inherited_attributes(&self) -> &'static [&'static str] {
        GUARD_INHERITED_ATTRIBUTES
    }

    fn run_action(&mut self, action: &str) -> Result<(), ActionError> {
        match action {
            ACTION_RUN => {
                let command = self
                    .base
                    .str_attribute("command")
                    .unwrap_or_else(|| self.name())
                    .to_string();
                let updated = run_command(&self.base, &command)?;
                self.base.finish(action, updated);
                Ok(())
            }
            ACTION_NOTHING => {
                self.base.finish(action, false);
                Ok(())
            }
            other => Err(unsupported_action(&self.base, other)),
        }
    }
}

pub(crate) fn unsupported_action(base: &ResourceBase, action: &str) -> ActionError {
    ActionError::new(
        ErrorKind::UnsupportedAction,
        format!("{} has no action `{action}`", base.label()),
    )
}

/// Run `command` with the process settings held in `base`'s attributes.
///
/// Returns whether anything ran: `false` when the `creates` path already exists.
#[instrument(skip_all, fields(resource = %base.label()))]
pub(crate) fn run_command(base: &ResourceBase, command: &str) -> Result<bool, ActionError> {
    if let Some(creates) = base.str_attribute("creates") {
        let target = match base.str_attribute("cwd") {
            Some(cwd) => Path::new(cwd).join(creates),
            None => PathBuf::from(creates),
        };
        if target.exists() {
            debug!(creates = %target.display(), "skipping command, creates path exists");
            return Ok(false);
        }
    }

    let context = base.context().ok_or_else(|| {
        ActionError::new(
            ErrorKind::Io,
            format!("{} has no run context", base.label()),
        )
    })?;
    let spec = command_spec(base, command)?;
    info!(command = %spec.command, "running command");

    let output = context
        .runner()
        .run(&spec)
        .map_err(|err| ActionError::new(ErrorKind::Io, format!("{err:#}")))?;

    if output.timed_out {
        warn!(timeout_secs = spec.timeout.as_secs(), "command timed out");
        return Err(ActionError::new(
            ErrorKind::CommandTimeout,
            format!(
                "command `{command}` timed out after {}s",
                spec.timeout.as_secs()
            ),
        ));
    }

    let returns = allowed_exit_codes(base)?;
    match output.exit_code {
        Some(code) if returns.contains(&code) => Ok(true),
        code => {
            let received = code.map_or_else(|| "a signal".to_string(), |c| c.to_string());
            Err(ActionError::new(
                ErrorKind::ShellCommandFailed,
                format!(
                    "expected process to exit with {returns:?}, but received {received}\n{}",
                    output.stderr_tail(10)
                ),
            ))
        }
    }
}

fn command_spec(base: &ResourceBase, command: &str) -> Result<CommandSpec, ActionError> {
    let timeout = match base.attribute("timeout") {
        Some(AttrValue::Int(secs)) => {
            let secs = u64::try_from(*secs)
                .map_err(|_| invalid(base, "timeout must not be negative"))?;
            Duration::from_secs(secs)
        }
        _ => DEFAULT_COMMAND_TIMEOUT,
    };

    let mut spec = CommandSpec::new(command, timeout);
    spec.cwd = base.str_attribute("cwd").map(PathBuf::from);
    if let Some(AttrValue::Map(environment)) = base.attribute("environment") {
        spec.environment = environment.clone();
    }
    if let Some(AttrValue::List(path)) = base.attribute("path") {
        spec.path = path.clone();
    }
    spec.user = id_attribute(base, "user");
    spec.group = id_attribute(base, "group");
    spec.umask = id_attribute(base, "umask");
    Ok(spec)
}

fn id_attribute(base: &ResourceBase, name: &str) -> Option<String> {
    match base.attribute(name) {
        Some(AttrValue::Str(value)) => Some(value.clone()),
        Some(AttrValue::Int(value)) => Some(value.to_string()),
        _ => None,
    }
}

fn allowed_exit_codes(base: &ResourceBase) -> Result<Vec<i32>, ActionError> {
    let codes = match base.attribute("returns") {
        Some(AttrValue::Int(code)) => vec![*code],
        Some(AttrValue::IntList(codes)) => codes.clone(),
        _ => return Ok(vec![0]),
    };
    codes
        .into_iter()
        .map(|code| i32::try_from(code).map_err(|_| invalid(base, "returns out of range")))
        .collect()
}

fn invalid(base: &ResourceBase, message: &str) -> ActionError {
    ActionError::new(
        ErrorKind::InvalidAttribute,
        format!("{}: {message}", base.label()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeCommandRunner, linux_context};

    #[test]
    fn run_marks_updated_on_expected_exit() {
        let runner = FakeCommandRunner::new().exit("make install", 0);
        let mut resource = Execute::new("make install", Some(linux_context(&runner)));

        resource.run_action(ACTION_RUN).expect("run");
        assert_eq!(resource.updated(), Some(true));
        assert_eq!(runner.commands(), vec!["make install".to_string()]);
    }

    #[test]
    fn unexpected_exit_is_shell_command_failed() {
        let runner = FakeCommandRunner::new().exit("false", 1);
        let mut resource = Execute::new("check", Some(linux_context(&runner)));
        resource.set("command", Some("false".into())).expect("set");

        let err = resource.run_action(ACTION_RUN).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShellCommandFailed);
        assert_eq!(resource.updated(), None);
    }

    #[test]
    fn returns_accepts_listed_codes() {
        let runner = FakeCommandRunner::new().exit("grep -q x f", 1);
        let mut resource = Execute::new("grep -q x f", Some(linux_context(&runner)));
        resource
            .set("returns", Some(AttrValue::IntList(vec![0, 1])))
            .expect("set");

        resource.run_action(ACTION_RUN).expect("run");
        assert_eq!(resource.updated(), Some(true));
    }

    #[test]
    fn timeout_is_command_timeout() {
        let runner = FakeCommandRunner::new().timeout("sleep 100");
        let mut resource = Execute::new("sleep 100", Some(linux_context(&runner)));
        resource.set("timeout", Some(AttrValue::Int(1))).expect("set");

        let err = resource.run_action(ACTION_RUN).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CommandTimeout);
        assert_eq!(runner.specs()[0].timeout, Duration::from_secs(1));
    }

    #[test]
    fn creates_path_skips_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("done"), "").expect("write marker");
        let runner = FakeCommandRunner::new();
        let mut resource = Execute::new("build", Some(linux_context(&runner)));
        resource
            .set("cwd", Some(temp.path().display().to_string().into()))
            .expect("set cwd");
        resource.set("creates", Some("done".into())).expect("set creates");

        resource.run_action(ACTION_RUN).expect("run");
        assert_eq!(resource.updated(), Some(false));
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn process_attributes_reach_command_spec() {
        let runner = FakeCommandRunner::new();
        let mut resource = Execute::new("id", Some(linux_context(&runner)));
        resource.set("user", Some(AttrValue::Int(1000))).expect("user");
        resource.set("umask", Some("022".into())).expect("umask");
        resource.set("cwd", Some("/srv".into())).expect("cwd");

        resource.run_action(ACTION_RUN).expect("run");
        let spec = &runner.specs()[0];
        assert_eq!(spec.user.as_deref(), Some("1000"));
        assert_eq!(spec.umask.as_deref(), Some("022"));
        assert_eq!(spec.cwd, Some(PathBuf::from("/srv")));
        assert_eq!(spec.timeout, DEFAULT_COMMAND_TIMEOUT);
    }

    #[test]
    fn unknown_action_is_unsupported() {
        let mut resource = Execute::new("x", None);
        let err = resource.run_action("restart").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedAction);
    }

    #[test]
    fn missing_context_is_io_error() {
        let mut resource = Execute::new("true", None);
        let err = resource.run_action(ACTION_RUN).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
