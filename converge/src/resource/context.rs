//! Run context shared by the resources of one convergence run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::io::shell::CommandRunner;
use crate::resource::node::Node;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Record of one completed resource action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEvent {
    pub resource: String,
    pub action: String,
    pub updated: bool,
}

/// Node, command runner and event log for a set of resources.
///
/// Clones share the same event log. [`RunContext::anonymous`] derives a
/// context that shares only the node and runner service.
#[derive(Clone)]
pub struct RunContext {
    id: u64,
    node: Arc<Node>,
    runner: Arc<dyn CommandRunner>,
    events: Arc<Mutex<Vec<ResourceEvent>>>,
}

impl RunContext {
    pub fn new(node: Arc<Node>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            node,
            runner,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fresh context with an empty event log, bound to `parent`'s node.
    pub fn anonymous(parent: &RunContext) -> Self {
        Self::new(Arc::clone(&parent.node), Arc::clone(&parent.runner))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn record(&self, event: ResourceEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<ResourceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded actions that updated their resource.
    pub fn updated_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.updated)
            .count()
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("id", &self.id)
            .field("node", &self.node.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::shell::ShellCommandRunner;

    fn context() -> RunContext {
        RunContext::new(
            Arc::new(Node::new("web01", "linux")),
            Arc::new(ShellCommandRunner::default()),
        )
    }

    #[test]
    fn clones_share_event_log() {
        let ctx = context();
        let clone = ctx.clone();
        clone.record(ResourceEvent {
            resource: "execute[a]".to_string(),
            action: "run".to_string(),
            updated: true,
        });
        assert_eq!(ctx.updated_count(), 1);
        assert_eq!(ctx.id(), clone.id());
    }

    #[test]
    fn anonymous_context_is_isolated() {
        let parent = context();
        let anonymous = RunContext::anonymous(&parent);
        anonymous.record(ResourceEvent {
            resource: "bash[anonymous]".to_string(),
            action: "run".to_string(),
            updated: true,
        });

        assert_ne!(parent.id(), anonymous.id());
        assert!(Arc::ptr_eq(parent.node(), anonymous.node()));
        assert!(parent.events().is_empty());
        assert_eq!(anonymous.updated_count(), 1);
    }
}
