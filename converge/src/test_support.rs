//! Test-only helpers: scripted command runner and probe resources.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::core::block::{ConfigBlock, GuardBlock, Statement};
use crate::core::error::ActionError;
use crate::core::types::{AttrKind, ErrorKind, SourceLocation};
use crate::io::process::CommandOutput;
use crate::io::shell::{CommandRunner, CommandSpec};
use crate::resource::context::RunContext;
use crate::resource::node::Node;
use crate::resource::registry::ResourceRegistry;
use crate::resource::{ACTION_NOTHING, AttrSpec, Resource, ResourceBase};

#[derive(Debug, Clone)]
enum Scripted {
    Exit(i32),
    Timeout,
}

#[derive(Debug, Default)]
struct RunnerState {
    specs: Vec<CommandSpec>,
    scripts: Vec<String>,
}

/// Command runner that answers from a script instead of spawning processes.
///
/// A rule matches when the command line contains its pattern; the first match
/// wins and unmatched commands exit 0. Clones share recorded state.
#[derive(Debug, Clone, Default)]
pub struct FakeCommandRunner {
    rules: Vec<(String, Scripted)>,
    state: Arc<Mutex<RunnerState>>,
}

impl FakeCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exit(mut self, pattern: &str, code: i32) -> Self {
        self.rules.push((pattern.to_string(), Scripted::Exit(code)));
        self
    }

    pub fn timeout(mut self, pattern: &str) -> Self {
        self.rules.push((pattern.to_string(), Scripted::Timeout));
        self
    }

    pub fn specs(&self) -> Vec<CommandSpec> {
        self.lock().specs.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.specs().into_iter().map(|spec| spec.command).collect()
    }

    /// Contents of script files passed as the last quoted argument.
    pub fn scripts(&self) -> Vec<String> {
        self.lock().scripts.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let script = quoted_path(&spec.command)
            .filter(|path| Path::new(path).is_file())
            .and_then(|path| fs::read_to_string(path).ok());
        {
            let mut state = self.lock();
            state.specs.push(spec.clone());
            state.scripts.extend(script);
        }

        let scripted = self
            .rules
            .iter()
            .find(|(pattern, _)| spec.command.contains(pattern.as_str()))
            .map(|(_, scripted)| scripted.clone());
        Ok(match scripted {
            Some(Scripted::Exit(code)) => CommandOutput::exited(code),
            Some(Scripted::Timeout) => CommandOutput::timed_out(),
            None => CommandOutput::exited(0),
        })
    }
}

fn quoted_path(command: &str) -> Option<&str> {
    let rest = command.strip_suffix('"')?;
    let start = rest.rfind('"')?;
    Some(&rest[start + 1..])
}

pub fn linux_node() -> Arc<Node> {
    Arc::new(Node::new("web01", "linux"))
}

/// Run context on a linux node backed by `runner`.
pub fn linux_context(runner: &FakeCommandRunner) -> RunContext {
    RunContext::new(linux_node(), Arc::new(runner.clone()))
}

/// Run context on a windows node backed by `runner`.
pub fn windows_context(runner: &FakeCommandRunner) -> RunContext {
    RunContext::new(
        Arc::new(Node::new("win01", "windows")),
        Arc::new(runner.clone()),
    )
}

/// Observation recorded by a probe resource when its action runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRun {
    pub context_id: u64,
    pub action: String,
    pub user: Option<String>,
    pub source_location: Option<SourceLocation>,
    /// Actions this same instance ran before this one.
    pub prior_runs: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ProbeLog(Arc<Mutex<Vec<ProbeRun>>>);

impl ProbeLog {
    pub fn runs(&self) -> Vec<ProbeRun> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, run: ProbeRun) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(run);
    }
}

const PROBE_SCHEMA: &[AttrSpec] = &[
    AttrSpec::new("user", &[AttrKind::Str]),
    AttrSpec::new("cwd", &[AttrKind::Str]),
    AttrSpec::new("outcome", &[AttrKind::Str]),
];

/// Resource whose `run` action reports the outcome named by its `outcome`
/// attribute: `updated`, `unchanged`, or an error kind such as
/// `shell_command_failed`.
pub struct ProbeResource {
    base: ResourceBase,
    log: ProbeLog,
    runs: usize,
}

impl ProbeResource {
    pub fn new(name: &str, context: Option<RunContext>, log: ProbeLog) -> Self {
        Self {
            base: ResourceBase::new(name, "probe", context, "run"),
            log,
            runs: 0,
        }
    }
}

impl Resource for ProbeResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    fn schema(&self) -> &'static [AttrSpec] {
        PROBE_SCHEMA
    }

    fn run_action(&mut self, action: &str) -> Result<(), ActionError> {
        self.log.push(ProbeRun {
            context_id: self.context().map_or(0, RunContext::id),
            action: action.to_string(),
            user: self.base.str_attribute("user").map(str::to_string),
            source_location: self.source_location().cloned(),
            prior_runs: self.runs,
        });
        self.runs += 1;

        if action == ACTION_NOTHING {
            self.base.finish(action, false);
            return Ok(());
        }
        match self.base.str_attribute("outcome").unwrap_or("unchanged") {
            "updated" => {
                self.base.finish(action, true);
                Ok(())
            }
            "unchanged" => {
                self.base.finish(action, false);
                Ok(())
            }
            other => {
                let kind: ErrorKind =
                    serde_json::from_value(serde_json::Value::String(other.to_string()))
                        .unwrap_or(ErrorKind::Io);
                Err(ActionError::new(kind, format!("probe outcome {other}")))
            }
        }
    }
}

/// Builtin registry plus a `probe` type that records into `log`.
pub fn probe_registry(log: &ProbeLog) -> ResourceRegistry {
    let mut registry = ResourceRegistry::with_builtins();
    let log = log.clone();
    registry.register("probe", &[], move |name, context| {
        Box::new(ProbeResource::new(name, context, log.clone()))
    });
    registry
}

/// Block guard against the probe type with the given outcome.
pub fn probe_block(outcome: &str) -> GuardBlock {
    GuardBlock::new(
        "probe",
        ConfigBlock::new(vec![Statement::set("outcome", outcome)]),
    )
}

/// Resource that supports no attributes at all.
pub struct BareResource {
    base: ResourceBase,
}

impl BareResource {
    pub fn new(name: &str) -> Self {
        Self {
            base: ResourceBase::new(name, "bare", None, ACTION_NOTHING),
        }
    }
}

impl Resource for BareResource {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    fn schema(&self) -> &'static [AttrSpec] {
        &[]
    }

    fn run_action(&mut self, action: &str) -> Result<(), ActionError> {
        self.base.finish(action, false);
        Ok(())
    }
}
