//! Resource-type registry: resolves a type symbol for a node's platform.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::error::GuardError;
use crate::resource::Resource;
use crate::resource::context::RunContext;
use crate::resource::execute::Execute;
use crate::resource::node::Node;
use crate::resource::powershell::PowershellScript;
use crate::resource::script::Script;

/// Builds a resource of one type from a name and an optional run context.
pub type Constructor = Arc<dyn Fn(&str, Option<RunContext>) -> Box<dyn Resource> + Send + Sync>;

#[derive(Clone)]
struct ResourceType {
    /// Platforms the type is valid on; empty means every platform.
    platforms: Vec<String>,
    build: Constructor,
}

impl ResourceType {
    fn available_on(&self, node: &Node) -> bool {
        self.platforms.is_empty() || self.platforms.iter().any(|p| *p == node.platform)
    }
}

/// Mapping from resource-type symbol to constructor.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    types: BTreeMap<String, ResourceType>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `execute`, `script`, `bash`, `sh` and `powershell_script`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("execute", &[], |name, ctx| Box::new(Execute::new(name, ctx)));
        registry.register("script", &[], |name, ctx| {
            Box::new(Script::new(name, ctx, "script", None))
        });
        registry.register("bash", &[], |name, ctx| {
            Box::new(Script::new(name, ctx, "bash", Some("bash")))
        });
        registry.register("sh", &[], |name, ctx| {
            Box::new(Script::new(name, ctx, "sh", Some("sh")))
        });
        registry.register("powershell_script", &["windows"], |name, ctx| {
            Box::new(PowershellScript::new(name, ctx))
        });
        registry
    }

    /// Register `symbol`, replacing any earlier registration.
    pub fn register<F>(&mut self, symbol: &str, platforms: &[&str], build: F)
    where
        F: Fn(&str, Option<RunContext>) -> Box<dyn Resource> + Send + Sync + 'static,
    {
        self.types.insert(
            symbol.to_string(),
            ResourceType {
                platforms: platforms.iter().map(|p| p.to_string()).collect(),
                build: Arc::new(build),
            },
        );
    }

    /// Look up the constructor for `symbol` on `node`'s platform.
    pub fn resolve(&self, symbol: &str, node: &Node) -> Result<Constructor, GuardError> {
        self.types
            .get(symbol)
            .filter(|resource_type| resource_type.available_on(node))
            .map(|resource_type| Arc::clone(&resource_type.build))
            .ok_or_else(|| GuardError::UnknownResourceType {
                resource_type: symbol.to_string(),
                platform: node.platform.clone(),
            })
    }

    /// Build a resource bound to `context`, resolving the type for its node.
    pub fn build(
        &self,
        symbol: &str,
        name: &str,
        context: RunContext,
    ) -> Result<Box<dyn Resource>, GuardError> {
        let build = self.resolve(symbol, context.node())?;
        Ok(build(name, Some(context)))
    }
}
