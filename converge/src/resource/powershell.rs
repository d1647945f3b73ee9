//! `powershell_script` resource.

use crate::core::error::ActionError;
use crate::core::interpreter::{
    POWERSHELL_EXECUTABLE, guard_command, invocation_flags, normalize_exit_status,
};
use crate::core::types::AttrKind;
use crate::resource::context::RunContext;
use crate::resource::execute::{ACTION_RUN, unsupported_action};
use crate::resource::script::{ScriptInvocation, required, run_script, script_schema};
use crate::resource::{ACTION_NOTHING, AttrSpec, Resource, ResourceBase};

pub const POWERSHELL_SCHEMA: &[AttrSpec] =
    script_schema![AttrSpec::new("architecture", &[AttrKind::Str])];

const POWERSHELL_INHERITED_ATTRIBUTES: &[&str] = &[
    "cwd",
    "environment",
    "group",
    "path",
    "user",
    "umask",
    "architecture",
];

pub struct PowershellScript {
    base: ResourceBase,
}

impl PowershellScript {
    pub fn new(name: &str, context: Option<RunContext>) -> Self {
        let mut base = ResourceBase::new(name, "powershell_script", context, ACTION_RUN);
        base.preset("interpreter", POWERSHELL_EXECUTABLE);
        Self { base }
    }
}

impl Resource for PowershellScript {
    fn base(&self) -> &ResourceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceBase {
        &mut self.base
    }

    fn schema(&self) -> &'static [AttrSpec] {
        POWERSHELL_SCHEMA
    }

    fn inherited_attributes(&self) -> &'static [&'static str] {
        POWERSHELL_INHERITED_ATTRIBUTES
    }

    fn guard_interpreter(&self) -> Option<&str> {
        self.base.str_attribute("guard_interpreter")
    }

    fn guard_command(&self, command: String) -> String {
        guard_command(&command)
    }

    fn run_action(&mut self, action: &str) -> Result<(), ActionError> {
        match action {
            ACTION_RUN => {
                let code = normalize_exit_status(Some(required(&self.base, "code")?))
                    .unwrap_or_default();
                let flags = match self.base.str_attribute("flags") {
                    // User flags are host options, so they go before `-Command`.
                    Some(extra) => format!("{extra} {}", invocation_flags()),
                    None => invocation_flags(),
                };
                let invocation = ScriptInvocation {
                    interpreter: required(&self.base, "interpreter")?,
                    flags: Some(&flags),
                    extension: ".ps1",
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
