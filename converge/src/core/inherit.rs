//! Attribute inheritance from a parent resource into an anonymous one.

use serde::{Deserialize, Serialize};

use crate::core::error::AttributeError;
use crate::core::types::is_present;
use crate::resource::Resource;

/// When an inherited attribute overwrites the child's value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InheritPolicy {
    /// Copy the parent's value whenever either side holds a non-empty value,
    /// even if that clears a non-empty child default.
    #[default]
    ParentWins,
    /// Copy only when the parent's value is non-empty.
    ParentNonEmpty,
}

/// Copy `names` from `parent` into `child`, in order.
///
/// Names either side does not support are skipped silently. `parent` is only
/// read. Returns the names that were written.
pub fn propagate(
    parent: &dyn Resource,
    child: &mut dyn Resource,
    names: &[&str],
    policy: InheritPolicy,
) -> Result<Vec<String>, AttributeError> {
    let mut written = Vec::new();
    for &name in names {
        if !parent.supports(name) || !child.supports(name) {
            continue;
        }
        let parent_value = parent.get(name);
        let copy = match policy {
            InheritPolicy::ParentWins => is_present(parent_value) || is_present(child.get(name)),
            InheritPolicy::ParentNonEmpty => is_present(parent_value),
        };
        if copy {
            child.set(name, parent_value.cloned())?;
            written.push(name.to_string());
        }
    }
    Ok(written)
}
