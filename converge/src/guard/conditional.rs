//! `only_if` / `not_if` conditionals declared on a resource.
//!
//! A conditional holds either a command, judged by its exit status, or a block
//! guard, judged by the [`GuardEvaluator`]. Declaration routes commands through
//! the resource's `guard_command` hook and the guard translator.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::block::GuardBlock;
use crate::core::error::GuardError;
use crate::core::translate::translate;
use crate::guard::evaluator::GuardEvaluator;
use crate::io::shell::CommandSpec;
use crate::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// Run the action only if the condition holds.
    OnlyIf,
    /// Skip the action if the condition holds.
    NotIf,
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnlyIf => f.write_str("only_if"),
            Self::NotIf => f.write_str("not_if"),
        }
    }
}

/// Process settings for a command guard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOptions {
    pub cwd: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardSource {
    Command {
        command: String,
        options: CommandOptions,
    },
    Block(GuardBlock),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conditional {
    pub kind: GuardKind,
    pub source: GuardSource,
}

impl Conditional {
    pub fn only_if(
        parent: &dyn Resource,
        command: Option<String>,
        block: Option<GuardBlock>,
    ) -> Result<Self, GuardError> {
        Self::declare(parent, GuardKind::OnlyIf, command, CommandOptions::default(), block)
    }

    pub fn not_if(
        parent: &dyn Resource,
        command: Option<String>,
        block: Option<GuardBlock>,
    ) -> Result<Self, GuardError> {
        Self::declare(parent, GuardKind::NotIf, command, CommandOptions::default(), block)
    }

    /// Declare a guard on `parent` from a command, a block, or neither.
    ///
    /// Exactly one of `command` and `block` must be given.
    pub fn declare(
        parent: &dyn Resource,
        kind: GuardKind,
        command: Option<String>,
        options: CommandOptions,
        block: Option<GuardBlock>,
    ) -> Result<Self, GuardError> {
        let command = command.map(|command| parent.guard_command(command));
        let translated = translate(parent.guard_interpreter(), command, block);
        let source = match (translated.command, translated.block) {
            (Some(command), None) => GuardSource::Command { command, options },
            (None, Some(block)) => GuardSource::Block(block),
            (Some(_), Some(_)) => {
                return Err(GuardError::MalformedGuard(format!(
                    "{kind} takes either a command or a block, not both"
                )));
            }
            (None, None) => {
                return Err(GuardError::MalformedGuard(format!(
                    "{kind} requires either a command or a block"
                )));
            }
        };
        Ok(Self { kind, source })
    }

    /// Whether the condition holds for `parent`.
    ///
    /// Command guards hold on exit status 0; a timed-out command does not
    /// hold. Block guards hold only on [`GuardResult::True`].
    ///
    /// [`GuardResult::True`]: crate::core::types::GuardResult::True
    #[instrument(skip_all, fields(guard = %self.description()))]
    pub fn holds(
        &self,
        parent: &dyn Resource,
        evaluator: &GuardEvaluator,
    ) -> Result<bool, GuardError> {
        match &self.source {
            GuardSource::Command { command, options } => {
                let context = parent.context().ok_or(GuardError::InvalidNode)?;
                let timeout = options
                    .timeout_secs
                    .map_or(evaluator.command_timeout(), Duration::from_secs);
                let mut spec = CommandSpec::new(command.clone(), timeout);
                spec.cwd = options.cwd.clone();
                spec.environment = options.environment.clone();

                let output = context.runner().run(&spec).map_err(|err| {
                    GuardError::CommandFailed {
                        command: command.clone(),
                        message: format!("{err:#}"),
                    }
                })?;
                if output.timed_out {
                    warn!(
                        timeout_secs = timeout.as_secs(),
                        "guard command timed out"
                    );
                    return Ok(false);
                }
                debug!(exit_code = ?output.exit_code, "guard command finished");
                Ok(output.success())
            }
            GuardSource::Block(block) => Ok(evaluator.evaluate(parent, block)?.holds()),
        }
    }

    /// Whether the guarded action should run.
    pub fn continue_run(
        &self,
        parent: &dyn Resource,
        evaluator: &GuardEvaluator,
    ) -> Result<bool, GuardError> {
        let holds = self.holds(parent, evaluator)?;
        Ok(match self.kind {
            GuardKind::OnlyIf => holds,
            GuardKind::NotIf => !holds,
        })
    }

    /// Short human-readable form, e.g. `not_if "test -f /tmp/x"`.
    pub fn description(&self) -> String {
        match &self.source {
            GuardSource::Command { command, .. } => format!("{} {command:?}", self.kind),
            GuardSource::Block(block) => {
                format!("{} {{ {} block }}", self.kind, block.resource_type)
            }
        }
    }
}

/// First guard that stops the action from running, if any.
///
/// Guards are checked in order and evaluation stops at the first one that
/// blocks.
pub fn first_blocking<'a>(
    parent: &dyn Resource,
    guards: &'a [Conditional],
    evaluator: &GuardEvaluator,
) -> Result<Option<&'a Conditional>, GuardError> {
    for guard in guards {
        if !guard.continue_run(parent, evaluator)? {
            debug!(guard = %guard.description(), "guard blocks action");
            return Ok(Some(guard));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::block::{ConfigBlock, Statement};
    use crate::core::types::AttrValue;
    use crate::resource::execute::Execute;
    use crate::resource::powershell::PowershellScript;
    use crate::resource::registry::ResourceRegistry;
    use crate::resource::script::Script;
    use crate::test_support::{FakeCommandRunner, linux_context};

    fn evaluator() -> GuardEvaluator {
        GuardEvaluator::new(Arc::new(ResourceRegistry::with_builtins()))
    }

    #[test]
    fn only_if_continues_on_success() {
        let runner = FakeCommandRunner::new().exit("test -f /tmp/x", 0);
        let parent = Execute::new("deploy", Some(linux_context(&runner)));
        let guard =
            Conditional::only_if(&parent, Some("test -f /tmp/x".to_string()), None).expect("guard");

        assert!(guard.continue_run(&parent, &evaluator()).expect("continue"));
    }

    #[test]
    fn not_if_skips_on_success() {
        let runner = FakeCommandRunner::new().exit("test -f /tmp/x", 0);
        let parent = Execute::new("deploy", Some(linux_context(&runner)));
        let guard =
            Conditional::not_if(&parent, Some("test -f /tmp/x".to_string()), None).expect("guard");

        assert!(!guard.continue_run(&parent, &evaluator()).expect("continue"));
    }

    #[test]
    fn timed_out_command_does_not_hold() {
        let runner = FakeCommandRunner::new().timeout("sleep 1000");
        let parent = Execute::new("deploy", Some(linux_context(&runner)));
        let guard =
            Conditional::only_if(&parent, Some("sleep 1000".to_string()), None).expect("guard");

        assert!(!guard.holds(&parent, &evaluator()).expect("holds"));
        assert_eq!(runner.specs()[0].timeout, Duration::from_secs(600));
    }

    #[test]
    fn command_options_reach_runner() {
        let runner = FakeCommandRunner::new();
        let parent = Execute::new("deploy", Some(linux_context(&runner)));
        let mut options = CommandOptions {
            cwd: Some(PathBuf::from("/srv")),
            timeout_secs: Some(5),
            ..CommandOptions::default()
        };
        options
            .environment
            .insert("LANG".to_string(), "C".to_string());
        let guard = Conditional::declare(
            &parent,
            GuardKind::OnlyIf,
            Some("true".to_string()),
            options,
            None,
        )
        .expect("guard");

        guard.holds(&parent, &evaluator()).expect("holds");
        let spec = &runner.specs()[0];
        assert_eq!(spec.cwd, Some(PathBuf::from("/srv")));
        assert_eq!(spec.timeout, Duration::from_secs(5));
        assert_eq!(spec.environment.get("LANG").map(String::as_str), Some("C"));
    }

    #[test]
    fn script_with_guard_interpreter_rewrites_command() {
        let runner = FakeCommandRunner::new();
        let mut parent = Script::new("install", Some(linux_context(&runner)), "bash", Some("bash"));
        parent
            .set("guard_interpreter", Some(AttrValue::from("bash")))
            .expect("set");

        let guard =
            Conditional::only_if(&parent, Some("test -f /tmp/x".to_string()), None).expect("guard");
        match &guard.source {
            GuardSource::Block(block) => {
                assert_eq!(block.resource_type, "bash");
                assert_eq!(
                    block.block.statements,
                    vec![Statement::set("code", "test -f /tmp/x")]
                );
            }
            other => panic!("expected block guard, got {other:?}"),
        }
        assert_eq!(guard.description(), "only_if { bash block }");
    }

    #[test]
    fn interpreted_command_failure_does_not_hold() {
        let runner = FakeCommandRunner::new().exit("bash", 1);
        let mut parent = Script::new("install", Some(linux_context(&runner)), "bash", Some("bash"));
        parent
            .set("guard_interpreter", Some(AttrValue::from("bash")))
            .expect("set");
        let guard =
            Conditional::only_if(&parent, Some("test -f /tmp/x".to_string()), None).expect("guard");

        assert!(!guard.holds(&parent, &evaluator()).expect("holds"));
        assert_eq!(runner.scripts(), vec!["test -f /tmp/x".to_string()]);
    }

    #[test]
    fn script_without_guard_interpreter_keeps_command() {
        let runner = FakeCommandRunner::new();
        let parent = Script::new("install", Some(linux_context(&runner)), "bash", Some("bash"));
        let guard =
            Conditional::not_if(&parent, Some("test -f /tmp/x".to_string()), None).expect("guard");
        assert_eq!(guard.description(), "not_if \"test -f /tmp/x\"");
    }

    #[test]
    fn powershell_guard_command_is_prefixed() {
        let parent = PowershellScript::new("app", None);
        let guard =
            Conditional::only_if(&parent, Some("Test-Path C:\\app".to_string()), None).expect("guard");
        match guard.source {
            GuardSource::Command { command, .. } => {
                assert!(command.starts_with("powershell.exe -NoLogo"));
                assert!(command.ends_with("-Command Test-Path C:\\app"));
            }
            other => panic!("expected command guard, got {other:?}"),
        }
    }

    #[test]
    fn neither_or_both_sources_are_malformed() {
        let parent = Execute::new("deploy", None);
        let err = Conditional::only_if(&parent, None, None).unwrap_err();
        assert!(matches!(err, GuardError::MalformedGuard(_)));

        let block = GuardBlock::new("execute", ConfigBlock::default());
        let err = Conditional::not_if(&parent, Some("true".to_string()), Some(block)).unwrap_err();
        assert!(matches!(err, GuardError::MalformedGuard(_)));
    }

    #[test]
    fn first_blocking_stops_at_first_failure() {
        let runner = FakeCommandRunner::new().exit("false", 1);
        let parent = Execute::new("deploy", Some(linux_context(&runner)));
        let guards = vec![
            Conditional::only_if(&parent, Some("true".to_string()), None).expect("guard"),
            Conditional::only_if(&parent, Some("false".to_string()), None).expect("guard"),
            Conditional::not_if(&parent, Some("true".to_string()), None).expect("guard"),
        ];

        let blocking = first_blocking(&parent, &guards, &evaluator())
            .expect("evaluate")
            .expect("blocking guard");
        assert_eq!(blocking.description(), "only_if \"false\"");
        assert_eq!(runner.commands(), vec!["true".to_string(), "false".to_string()]);
    }
}
