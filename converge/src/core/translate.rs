//! Guard command translation for resources with a guard interpreter.

use std::collections::BTreeMap;

use crate::core::block::{ConfigBlock, GuardBlock};
use crate::core::types::{AttrValue, HandledKinds};

/// Attribute of the interpreter resource that receives the command text.
pub const CODE_ATTRIBUTE: &str = "code";

/// Normalized guard inputs after translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedGuard {
    pub command: Option<String>,
    pub block: Option<GuardBlock>,
}

/// Decide whether a guard runs as a literal command or as interpreter code.
///
/// A command with no block is rewritten only when `guard_interpreter` names a
/// resource type: the result is a block that sets that resource's `code` to
/// the command and treats a failed command as undetermined. Every other
/// combination passes through unchanged.
pub fn translate(
    guard_interpreter: Option<&str>,
    command: Option<String>,
    block: Option<GuardBlock>,
) -> TranslatedGuard {
    match (guard_interpreter, command, block) {
        (Some(interpreter), Some(command), None) => {
            let mut attributes = BTreeMap::new();
            attributes.insert(CODE_ATTRIBUTE.to_string(), AttrValue::Str(command));
            let block = GuardBlock::new(interpreter, ConfigBlock::from_attributes(&attributes))
                .handled(HandledKinds::shell_command_failed());
            TranslatedGuard {
                command: None,
                block: Some(block),
            }
        }
        (_, command, block) => TranslatedGuard { command, block },
    }
}
