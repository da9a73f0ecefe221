//! Graph Nodes
//!
//! This module defines node identity, node state and the object-safe [`Node`]
//! trait that both evaluators drive.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::GraphResult;

use super::dependency::Dependencies;
use super::port::AnyPort;
use super::subscription::{AlertBus, Subscription};

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a node's cached value can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// The node must recompute before its value is trustworthy.
    Stale,

    /// The cached value is valid for the current dependency versions.
    Processed,

    /// The last computation failed. The cached value, if any, is the last
    /// one that succeeded.
    Error,
}

/// A unit of computation in the graph.
///
/// Implemented by leaf values and derived nodes. Downstream code only ever
/// sees nodes through [`NodeRef`], so every method here is object safe.
pub trait Node: Send + Sync {
    /// Identity of this node. Stable for the node's lifetime.
    fn id(&self) -> NodeId;

    /// Human-readable node type or parameter name.
    fn name(&self) -> &str;

    /// Name and id, used in diagnostics.
    fn label(&self) -> String {
        format!("{}{}", self.name(), self.id())
    }

    /// Number of successful recomputations (or external sets, for values).
    ///
    /// Never forces computation.
    fn version(&self) -> u64;

    /// Current state. Staleness is transitive: a change anywhere upstream
    /// makes this node stale before it is read again.
    fn state(&self) -> NodeState {
        if self.outdated() {
            NodeState::Stale
        } else if self.failed() {
            NodeState::Error
        } else {
            NodeState::Processed
        }
    }

    /// Whether this node or anything upstream of it must recompute.
    fn outdated(&self) -> bool;

    /// Whether the most recent computation attempt failed.
    fn failed(&self) -> bool;

    /// The error captured by the most recent failed computation.
    fn last_error(&self) -> Option<Arc<anyhow::Error>>;

    /// Upstream ports this node consumes, in declaration order.
    fn dependencies(&self) -> Dependencies;

    /// Bring this node up to date, recursively updating dependencies first.
    ///
    /// Returns `true` if this node's compute function ran.
    fn update(&self) -> GraphResult<bool>;

    /// Recompute this node if its own snapshot is outdated, assuming its
    /// dependencies are already current.
    ///
    /// Returns `true` if this node's compute function ran.
    fn process(&self) -> GraphResult<bool>;

    /// The alert bus that notifies subscribed dependents.
    fn alerts(&self) -> &AlertBus;

    /// Subscribe an observer to this node's alerts.
    fn add_subscription(&self, subscription: Subscription) {
        self.alerts().subscribe(subscription);
    }

    /// Names of the output ports this node exposes.
    fn output_names(&self) -> Vec<&'static str>;

    /// Look up a named output port without knowing its value type.
    fn output(self: Arc<Self>, name: &str) -> GraphResult<AnyPort>;
}

/// Shared handle to a type-erased node.
pub type NodeRef = Arc<dyn Node>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn node_id_round_trips_raw_value() {
        let id = NodeId::from(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.to_string(), "#42");
    }
}
