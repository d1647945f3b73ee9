//! Declarative configuration blocks executed against an anonymous resource.
//!
//! A block is data, not code: each statement names an attribute or capability
//! on the resource handle it is applied to.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{AttrValue, HandledKinds, SourceLocation};

/// One statement of a configuration block.
///
/// Keys outside a variant's fields are rejected rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, deny_unknown_fields)]
pub enum Statement {
    /// Write `value` into attribute `set`.
    Set { set: String, value: AttrValue },
    /// Call capability `invoke` with positional `args`.
    Invoke {
        invoke: String,
        #[serde(default)]
        args: Vec<AttrValue>,
    },
}

impl Statement {
    pub fn set(attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self::Set {
            set: attribute.into(),
            value: value.into(),
        }
    }

    pub fn invoke(capability: impl Into<String>, args: Vec<AttrValue>) -> Self {
        Self::Invoke {
            invoke: capability.into(),
            args,
        }
    }
}

/// Ordered statements plus the parameters the block declares.
///
/// Guard blocks run in the implicit context of the anonymous resource, so a
/// well-formed guard block declares no parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigBlock {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl ConfigBlock {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            params: Vec::new(),
            statements,
        }
    }

    /// Block that sets each attribute of a flat map, in key order.
    pub fn from_attributes(attributes: &BTreeMap<String, AttrValue>) -> Self {
        Self::new(
            attributes
                .iter()
                .map(|(name, value)| Statement::set(name.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn is_well_formed(&self, args: &[AttrValue]) -> bool {
        self.params.is_empty() && args.is_empty()
    }
}

/// A block guard: the resource type to converge and how to judge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardBlock {
    pub resource_type: String,
    pub block: ConfigBlock,
    /// Positional arguments passed alongside the block; must be empty.
    pub args: Vec<AttrValue>,
    pub handled: HandledKinds,
    /// Action to run instead of the resource's default.
    pub action: Option<String>,
    pub source_location: Option<SourceLocation>,
}

impl GuardBlock {
    pub fn new(resource_type: impl Into<String>, block: ConfigBlock) -> Self {
        Self {
            resource_type: resource_type.into(),
            block,
            args: Vec::new(),
            handled: HandledKinds::none(),
            action: None,
            source_location: None,
        }
    }

    pub fn handled(mut self, handled: HandledKinds) -> Self {
        self.handled = handled;
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn source_location(mut self, location: SourceLocation) -> Self {
        self.source_location = Some(location);
        self
    }

    pub fn is_well_formed(&self) -> bool {
        self.block.is_well_formed(&self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_attributes_sets_each_key_in_order() {
        let mut attributes = BTreeMap::new();
        attributes.insert("user".to_string(), AttrValue::from("alice"));
        attributes.insert("code".to_string(), AttrValue::from("exit 0"));

        let block = ConfigBlock::from_attributes(&attributes);
        assert_eq!(
            block.statements,
            vec![
                Statement::set("code", "exit 0"),
                Statement::set("user", "alice"),
            ]
        );
        assert!(block.is_well_formed(&[]));
    }

    #[test]
    fn block_with_params_or_args_is_malformed() {
        let mut block = ConfigBlock::new(vec![Statement::set("code", "true")]);
        assert!(!block.is_well_formed(&[AttrValue::Int(1)]));
        block.params.push("resource".to_string());
        assert!(!block.is_well_formed(&[]));
    }

    #[test]
    fn statements_parse_from_toml() {
        let block: ConfigBlock = toml::from_str(
            r#"
            [[statements]]
            set = "command"
            value = "true"

            [[statements]]
            invoke = "action"
            args = ["nothing"]
            "#,
        )
        .expect("parse");
        assert_eq!(
            block.statements,
            vec![
                Statement::set("command", "true"),
                Statement::invoke("action", vec![AttrValue::from("nothing")]),
            ]
        );
    }

    #[test]
    fn statements_with_extra_keys_are_rejected() {
        let set_with_args = toml::from_str::<ConfigBlock>(
            r#"statements = [{ set = "command", value = "true", args = ["x"] }]"#,
        );
        assert!(set_with_args.is_err());

        let invoke_with_value = toml::from_str::<ConfigBlock>(
            r#"statements = [{ invoke = "action", args = ["run"], value = 1 }]"#,
        );
        assert!(invoke_with_value.is_err());
    }
}
