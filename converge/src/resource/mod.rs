//! Resource model: the capability interface guards are evaluated against.
//!
//! Every resource type declares an attribute schema. `supports(name)` is a
//! lookup in that schema, so inheritance and block statements can probe an
//! attribute without knowing the concrete type.

pub mod context;
pub mod execute;
pub mod node;
pub mod powershell;
pub mod registry;
pub mod script;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::{ActionError, AttributeError};
use crate::core::types::{AttrKind, AttrValue, SourceLocation};
use crate::resource::context::{ResourceEvent, RunContext};
use crate::resource::node::Node;

/// Action that converges nothing and never updates.
pub const ACTION_NOTHING: &str = "nothing";

/// One attribute a resource type accepts, with its permitted value kinds.
#[derive(Debug, Clone, Copy)]
pub struct AttrSpec {
    pub name: &'static str,
    pub kinds: &'static [AttrKind],
}

impl AttrSpec {
    pub const fn new(name: &'static str, kinds: &'static [AttrKind]) -> Self {
        Self { name, kinds }
    }
}

/// State every resource carries regardless of type.
#[derive(Debug)]
pub struct ResourceBase {
    name: String,
    resource_type: String,
    context: Option<RunContext>,
    action: String,
    updated: Option<bool>,
    source_location: Option<SourceLocation>,
    attributes: BTreeMap<String, AttrValue>,
}

impl ResourceBase {
    pub fn new(
        name: impl Into<String>,
        resource_type: impl Into<String>,
        context: Option<RunContext>,
        default_action: &str,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            context,
            action: default_action.to_string(),
            updated: None,
            source_location: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn str_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttrValue::as_str)
    }

    /// Store an attribute without schema checks; constructors use this for defaults.
    pub fn preset(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn context(&self) -> Option<&RunContext> {
        self.context.as_ref()
    }

    pub fn label(&self) -> String {
        format!("{}[{}]", self.resource_type, self.name)
    }

    /// Set the `updated` flag after an action and record it in the run context.
    pub fn finish(&mut self, action: &str, updated: bool) {
        self.updated = Some(updated);
        if let Some(context) = &self.context {
            context.record(ResourceEvent {
                resource: self.label(),
                action: action.to_string(),
                updated,
            });
        }
    }
}

/// A named, typed unit of desired state.
///
/// Implementors provide their schema and actions; attribute access, action
/// bookkeeping and capability dispatch come from the provided methods.
pub trait Resource: Send {
    fn base(&self) -> &ResourceBase;

    fn base_mut(&mut self) -> &mut ResourceBase;

    fn schema(&self) -> &'static [AttrSpec];

    /// Converge `action`, setting `updated` on success.
    fn run_action(&mut self, action: &str) -> Result<(), ActionError>;

    /// Attributes copied from this resource into anonymous guard resources.
    fn inherited_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Resource type that command guards are rewritten to run under.
    fn guard_interpreter(&self) -> Option<&str> {
        None
    }

    /// Hook applied to command guards before translation.
    fn guard_command(&self, command: String) -> String {
        command
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    fn resource_type(&self) -> &str {
        &self.base().resource_type
    }

    fn label(&self) -> String {
        self.base().label()
    }

    fn context(&self) -> Option<&RunContext> {
        self.base().context()
    }

    fn node(&self) -> Option<&Arc<Node>> {
        self.context().map(RunContext::node)
    }

    fn supports(&self, attribute: &str) -> bool {
        self.schema().iter().any(|spec| spec.name == attribute)
    }

    /// Current value of a supported attribute.
    fn get(&self, attribute: &str) -> Option<&AttrValue> {
        self.base().attribute(attribute)
    }

    /// Write or clear a supported attribute, checking its value kind.
    fn set(&mut self, attribute: &str, value: Option<AttrValue>) -> Result<(), AttributeError> {
        let Some(spec) = self.schema().iter().find(|spec| spec.name == attribute) else {
            return Err(AttributeError::Unsupported {
                resource_type: self.resource_type().to_string(),
                attribute: attribute.to_string(),
            });
        };
        let base = self.base_mut();
        match value {
            Some(value) => {
                if !spec.kinds.contains(&value.kind()) {
                    return Err(AttributeError::WrongKind {
                        resource_type: base.resource_type.clone(),
                        attribute: attribute.to_string(),
                        expected: spec.kinds.to_vec(),
                        found: value.kind(),
                    });
                }
                base.attributes.insert(attribute.to_string(), value);
            }
            None => {
                base.attributes.remove(attribute);
            }
        }
        Ok(())
    }

    fn action(&self) -> &str {
        &self.base().action
    }

    fn set_action(&mut self, action: &str) {
        self.base_mut().action = action.to_string();
    }

    fn updated(&self) -> Option<bool> {
        self.base().updated
    }

    fn source_location(&self) -> Option<&SourceLocation> {
        self.base().source_location.as_ref()
    }

    fn set_source_location(&mut self, location: SourceLocation) {
        self.base_mut().source_location = Some(location);
    }

    /// Dispatch a named capability call from a configuration block.
    ///
    /// `action` sets the default action; any supported attribute acts as a
    /// single-argument setter.
    fn invoke(&mut self, capability: &str, args: &[AttrValue]) -> Result<(), AttributeError> {
        match (capability, args) {
            ("action", [AttrValue::Str(action)]) => {
                self.set_action(action);
                Ok(())
            }
            (name, [value]) if self.supports(name) => self.set(name, Some(value.clone())),
            _ => Err(AttributeError::UnknownCapability {
                resource_type: self.resource_type().to_string(),
                capability: capability.to_string(),
                arity: args.len(),
            }),
        }
    }
}
