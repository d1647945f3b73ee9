//! Guard evaluation CLI.
//!
//! Reads a TOML resource declaration, evaluates its `only_if` / `not_if`
//! guards on the local machine, and reports whether the action would run.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use converge::core::interpreter::{guard_command, normalize_exit_status};
use converge::exit_codes;
use converge::guard::{Conditional, GuardEvaluator, first_blocking};
use converge::io::config::{ConvergeConfig, load_config, write_config};
use converge::io::declaration::load_declaration;
use converge::io::shell::ShellCommandRunner;
use converge::logging;
use converge::resource::Resource;
use converge::resource::context::{ResourceEvent, RunContext};
use converge::resource::registry::ResourceRegistry;

#[derive(Parser)]
#[command(
    name = "converge",
    version,
    about = "Evaluate only_if / not_if guards for declared resources"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        #[arg(long, default_value = "converge.toml")]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Evaluate every guard and report whether the action would run.
    Check {
        /// Resource declaration (TOML).
        declaration: PathBuf,
        #[arg(long, default_value = "converge.toml")]
        config: PathBuf,
    },
    /// Evaluate guards, then run the action if none blocks it.
    Apply {
        /// Resource declaration (TOML).
        declaration: PathBuf,
        #[arg(long, default_value = "converge.toml")]
        config: PathBuf,
    },
    /// Print the PowerShell command line used for a guard command.
    GuardCommand { command: String },
    /// Print PowerShell code wrapped with exit-status normalization.
    Normalize { code: String },
}

/// JSON report printed by `check` and `apply`.
#[derive(Debug, Serialize)]
struct Report {
    resource: String,
    action: String,
    run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    blocked_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated: Option<bool>,
    events: Vec<ResourceEvent>,
}

/// A declared resource, bound to a run context, with its guards.
struct Prepared {
    context: RunContext,
    resource: Box<dyn Resource>,
    guards: Vec<Conditional>,
    evaluator: GuardEvaluator,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Check {
            declaration,
            config,
        } => cmd_check(&declaration, &config, false),
        Command::Apply {
            declaration,
            config,
        } => cmd_check(&declaration, &config, true),
        Command::GuardCommand { command } => {
            println!("{}", guard_command(&command));
            Ok(exit_codes::OK)
        }
        Command::Normalize { code } => {
            if let Some(script) = normalize_exit_status(Some(code.as_str())) {
                println!("{script}");
            }
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &ConvergeConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    Ok(exit_codes::OK)
}

fn cmd_check(declaration_path: &Path, config_path: &Path, apply: bool) -> Result<i32> {
    let Prepared {
        context,
        mut resource,
        guards,
        evaluator,
    } = prepare(declaration_path, config_path)?;

    let blocking = first_blocking(resource.as_ref(), &guards, &evaluator)
        .with_context(|| format!("evaluate guards for {}", resource.label()))?;
    let action = resource.action().to_string();

    let mut report = Report {
        resource: resource.label(),
        action: action.clone(),
        run: blocking.is_none(),
        blocked_by: blocking.map(Conditional::description),
        updated: None,
        events: Vec::new(),
    };

    if apply && report.run {
        resource
            .run_action(&action)
            .with_context(|| format!("run {} on {}", action, report.resource))?;
        report.updated = resource.updated();
    }
    report.events = context.events();

    print_json(&report)?;
    Ok(if report.run {
        exit_codes::OK
    } else {
        exit_codes::SKIPPED
    })
}

fn prepare(declaration_path: &Path, config_path: &Path) -> Result<Prepared> {
    let config = load_config(config_path)?;
    let declaration = load_declaration(declaration_path)?;

    let registry = Arc::new(ResourceRegistry::with_builtins());
    let runner = ShellCommandRunner::new(config.output_limit_bytes);
    let context = RunContext::new(Arc::new(declaration.node.clone()), Arc::new(runner));

    let decl = &declaration.resource;
    let mut resource = registry
        .build(&decl.resource_type, &decl.name, context.clone())
        .with_context(|| format!("declare {}[{}]", decl.resource_type, decl.name))?;
    for (name, value) in &decl.attributes {
        resource
            .set(name, Some(value.clone()))
            .with_context(|| format!("set {name} on {}", resource.label()))?;
    }
    if let Some(action) = &decl.action {
        resource.set_action(action);
    }

    let guards = declaration
        .guards
        .iter()
        .map(|guard| guard.to_conditional(resource.as_ref(), declaration_path))
        .collect::<Result<Vec<_>>>()?;

    let evaluator = GuardEvaluator::new(registry)
        .with_policy(config.guard.inherit_policy)
        .with_command_timeout(config.guard.timeout());

    Ok(Prepared {
        context,
        resource,
        guards,
        evaluator,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize report")?;
    println!("{payload}");
    Ok(())
}
