//! Block guard evaluation against an anonymous resource.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::block::{ConfigBlock, GuardBlock, Statement};
use crate::core::error::GuardError;
use crate::core::inherit::{InheritPolicy, propagate};
use crate::core::types::{AttrValue, GuardResult, HandledKinds};
use crate::guard::anonymous::AnonymousResourceFactory;
use crate::resource::Resource;
use crate::resource::registry::ResourceRegistry;

/// Timeout for command guards that do not set their own.
pub const DEFAULT_GUARD_TIMEOUT: Duration = Duration::from_secs(600);

/// Evaluates guards for resources resolved through one registry.
///
/// Evaluation is synchronous. Each call builds, converges and drops its own
/// anonymous resource; nothing is cached between calls.
#[derive(Clone)]
pub struct GuardEvaluator {
    registry: Arc<ResourceRegistry>,
    policy: InheritPolicy,
    command_timeout: Duration,
}

impl GuardEvaluator {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self {
            registry,
            policy: InheritPolicy::default(),
            command_timeout: DEFAULT_GUARD_TIMEOUT,
        }
    }

    pub fn with_policy(mut self, policy: InheritPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Converge `guard`'s block on a fresh anonymous resource and classify it.
    ///
    /// Action failures whose kind is in `guard.handled` become
    /// [`GuardResult::Undetermined`]; any other failure is returned as an error.
    #[instrument(skip_all, fields(parent = %parent.label(), resource_type = %guard.resource_type))]
    pub fn evaluate(
        &self,
        parent: &dyn Resource,
        guard: &GuardBlock,
    ) -> Result<GuardResult, GuardError> {
        if !guard.is_well_formed() {
            return Err(GuardError::MalformedGuard(
                "a block must be specified with no arguments".to_string(),
            ));
        }

        let mut resource =
            AnonymousResourceFactory::new(&self.registry).create(parent, &guard.resource_type)?;

        let inherited = propagate(
            parent,
            resource.as_mut(),
            parent.inherited_attributes(),
            self.policy,
        )?;
        debug!(?inherited, "inherited attributes");

        if let Some(location) = &guard.source_location {
            resource.set_source_location(location.clone());
        }

        apply_block(resource.as_mut(), &guard.block)?;

        let action = guard
            .action
            .clone()
            .unwrap_or_else(|| resource.action().to_string());

        let result = match resource.run_action(&action) {
            Ok(()) => GuardResult::from(resource.updated()),
            Err(err) if guard.handled.contains(err.kind) => {
                debug!(kind = %err.kind, err = %err, "guard action failed with handled kind");
                GuardResult::Undetermined
            }
            Err(err) => {
                warn!(kind = %err.kind, err = %err, "guard action failed");
                return Err(GuardError::UnhandledActionFailure(err));
            }
        };
        info!(?result, action = %action, "guard evaluated");
        Ok(result)
    }

    /// Evaluate a guard whose block sets each attribute of a flat map.
    pub fn evaluate_attributes(
        &self,
        parent: &dyn Resource,
        resource_type: &str,
        handled: HandledKinds,
        attributes: &BTreeMap<String, AttrValue>,
    ) -> Result<GuardResult, GuardError> {
        let guard = GuardBlock::new(resource_type, ConfigBlock::from_attributes(attributes))
            .handled(handled);
        self.evaluate(parent, &guard)
    }
}

/// Run each statement against the explicit resource handle.
fn apply_block(resource: &mut dyn Resource, block: &ConfigBlock) -> Result<(), GuardError> {
    for (index, statement) in block.statements.iter().enumerate() {
        let applied = match statement {
            Statement::Set { set, value } => resource.set(set, Some(value.clone())),
            Statement::Invoke { invoke, args } => resource.invoke(invoke, args),
        };
        applied.map_err(|source| GuardError::Statement { index, source })?;
    }
    Ok(())
}
