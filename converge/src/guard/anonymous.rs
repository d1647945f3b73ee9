//! Construction of throwaway resources for block guards.

use tracing::debug;

use crate::core::error::GuardError;
use crate::resource::Resource;
use crate::resource::context::RunContext;
use crate::resource::registry::ResourceRegistry;

/// Name given to every anonymous guard resource.
pub const ANONYMOUS_NAME: &str = "anonymous";

pub struct AnonymousResourceFactory<'a> {
    registry: &'a ResourceRegistry,
}

impl<'a> AnonymousResourceFactory<'a> {
    pub fn new(registry: &'a ResourceRegistry) -> Self {
        Self { registry }
    }

    /// Build a `resource_type` resource bound to `parent`'s node.
    ///
    /// The resource gets its own run context, so its actions never reach the
    /// parent's event log.
    pub fn create(
        &self,
        parent: &dyn Resource,
        resource_type: &str,
    ) -> Result<Box<dyn Resource>, GuardError> {
        let parent_context = parent.context().ok_or(GuardError::InvalidNode)?;
        let context = RunContext::anonymous(parent_context);
        debug!(
            parent = %parent.label(),
            resource_type,
            context_id = context.id(),
            "creating anonymous resource"
        );
        self.registry.build(resource_type, ANONYMOUS_NAME, context)
    }
}
