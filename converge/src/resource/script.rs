//! `script` family: run inline code through an interpreter.
//!
//! `bash` and `sh` are scripts with the interpreter preset. A script may name a
//! guard interpreter, in which case command guards are rewritten to run as
//! code of that resource type.

use std::io::Write;

use tracing::debug;

use crate::core::error::ActionError;
use crate::core::types::ErrorKind;
use crate::resource::context::RunContext;
use crate::resource::execute::{
    ACTION_RUN, GUARD_INHERITED_ATTRIBUTES, run_command, unsupported_action,
};
use crate::resource::{ACTION_NOTHING, AttrSpec, Resource, ResourceBase};

/// Schema of the `script` family: `execute` plus interpreter attributes,
/// followed by any type-specific attribute specs.
macro_rules! script_schema {
    ($($extra:expr),* $(,)?) => {
        $crate::resource::execute::command_schema![
            $crate::resource::AttrSpec::new("code", &[$crate::core::types::AttrKind::Str]),
            $crate::resource::AttrSpec::new("interpreter", &[$crate::core::types::AttrKind::Str]),
            $crate::resource::AttrSpec::new("flags", &[$crate::core::types::AttrKind::Str]),
            $crate::resource::AttrSpec::new(
                "guard_interpreter",
                &[$crate::core::types::AttrKind::Str],
            ),
            $($extra,)*
        ]
    };
}
pub(crate) use script_schema;

pub const SCRIPT_SCHEMA: &[AttrSpec] = script_schema![];

pub struct Script {
    base: ResourceBase,
}

impl Script {
    pub fn new(
        name: &str,
        context: Option<RunContext>,
        resource_type: &str,
        interpreter: Option<&str>,
    ) -> Self {
        let mut base = ResourceBase::new(name, resource_type, context, ACTION_RUN);
        if let Some(interpreter) = interpreter {
            base.preset("interpreter", interpreter);
        }
        Self { base }
    }
}

impl Resource for Script {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    fn schema(&self) -> &'static [AttrSpec] {
        SCRIPT_SCHEMA
    }

    fn inherited_attributes(&self) -> &'static [&'static str] {
        GUARD_INHERITED_ATTRIBUTES
    }

    fn guard_interpreter(&self) -> Option<&str> {
        self.base.str_attribute("guard_interpreter")
    }

    fn run_action(&mut self, action: &str) -> Result<(), ActionError> {
        match action {
            ACTION_RUN => {
                let code = required(&self.base, "code")?.to_string();
                let invocation = ScriptInvocation {
                    interpreter: required(&self.base, "interpreter")?,
                    flags: self.base.str_attribute("flags"),
                    extension: "",
                };
                let updated = run_script(&self.base, &invocation, &code)?;
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

/// How to hand a script file to its interpreter.
pub(crate) struct ScriptInvocation<'a> {
    pub interpreter: &'a str,
    pub flags: Option<&'a str>,
    /// File suffix some interpreters require, e.g. `.ps1`.
    pub extension: &'a str,
}

impl ScriptInvocation<'_> {
    fn command_line(&self, script_path: &str) -> String {
        match self.flags.filter(|flags| !flags.is_empty()) {
            Some(flags) => format!("{} {flags} \"{script_path}\"", self.interpreter),
            None => format!("{} \"{script_path}\"", self.interpreter),
        }
    }
}

/// Write `code` to a temporary file and run it through the interpreter.
///
/// The file lives until the command has finished.
pub(crate) fn run_script(
    base: &ResourceBase,
    invocation: &ScriptInvocation<'_>,
    code: &str,
) -> Result<bool, ActionError> {
    let mut file = tempfile::Builder::new()
        .prefix("converge-script-")
        .suffix(invocation.extension)
        .tempfile()
        .map_err(|err| io_error(base, "create script file", &err))?;
    file.write_all(code.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| io_error(base, "write script file", &err))?;

    let command = invocation.command_line(&file.path().display().to_string());
    debug!(resource = %base.label(), %command, "running script");
    run_command(base, &command)
}

pub(crate) fn required<'a>(base: &'a ResourceBase, name: &str) -> Result<&'a str, ActionError> {
    base.str_attribute(name).ok_or_else(|| {
        ActionError::new(
            ErrorKind::InvalidAttribute,
            format!("{} requires `{name}`", base.label()),
        )
    })
}

fn io_error(base: &ResourceBase, what: &str, err: &std::io::Error) -> ActionError {
    ActionError::new(ErrorKind::Io, format!("{}: {what}: {err}", base.label()))
}
