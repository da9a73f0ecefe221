//! Value Nodes
//!
//! A [`Value`] is a leaf of the graph: it has no dependencies, is always
//! processed, and changes only through [`Value::set`]. Parameters and
//! configuration enter the graph through values.
//!
//! # How Values Work
//!
//! 1. Reading a value never computes anything; it clones the stored value.
//!
//! 2. Setting a value bumps its version by one and alerts subscribers.
//!
//! 3. Derived nodes notice the new version the next time they are read, or
//!    the next time a scheduler processes them.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::graph::{
    AlertBus, AnyPort, Dependencies, Dependency, Node, NodeId, NodeRef, NodeState, Port, Source,
};

/// Output name of a value's single port.
pub const VALUE_OUTPUT: &str = "value";

/// A leaf node holding a value of type `T`.
///
/// Clones share the same node.
///
/// # Example
///
/// ```rust,ignore
/// let times = Value::named("times", 5);
///
/// // Read the value
/// let n = times.get();
///
/// // Update the value (bumps the version, alerts subscribers)
/// times.set(3);
/// ```
pub struct Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    node: Arc<ValueNode<T>>,
}

struct ValueNode<T> {
    id: NodeId,
    name: String,
    value: RwLock<T>,
    version: AtomicU64,
    alerts: AlertBus,
}

impl<T> Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new value node.
    pub fn new(value: T) -> Self {
        Self::named("value", value)
    }

    /// Create a new value node with a diagnostic name.
    pub fn named(name: impl Into<String>, value: T) -> Self {
        let id = NodeId::new();
        Self {
            node: Arc::new(ValueNode {
                id,
                name: name.into(),
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                alerts: AlertBus::new(id),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Number of times the value has been set.
    pub fn version(&self) -> u64 {
        self.node.version.load(Ordering::Acquire)
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.node.value.read().clone()
    }

    /// Set a new value, bump the version and alert subscribers.
    pub fn set(&self, value: T) {
        *self.node.value.write() = value;
        self.node.bump();
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.node.value.read();
            f(&guard)
        };
        self.set(new_value);
    }

    /// The value's output port.
    pub fn port(&self) -> Port<T> {
        Port::new(
            VALUE_OUTPUT,
            self.node(),
            Arc::clone(&self.node) as Arc<dyn Source<T>>,
        )
    }

    /// Type-erased handle to the node.
    pub fn node(&self) -> NodeRef {
        Arc::clone(&self.node) as NodeRef
    }

    /// Number of live subscriptions on this value.
    pub fn subscriber_count(&self) -> usize {
        self.node.alerts.len()
    }
}

impl<T> ValueNode<T> {
    fn bump(&self) {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(node = %self.id, name = %self.name, version, "value set");
        self.alerts.alert(version, NodeState::Processed);
    }
}

impl<T> Node for ValueNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn state(&self) -> NodeState {
        NodeState::Processed
    }

    fn outdated(&self) -> bool {
        false
    }

    fn failed(&self) -> bool {
        false
    }

    fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        None
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::new()
    }

    fn update(&self) -> GraphResult<bool> {
        Ok(false)
    }

    fn process(&self) -> GraphResult<bool> {
        Ok(false)
    }

    fn alerts(&self) -> &AlertBus {
        &self.alerts
    }

    fn output_names(&self) -> Vec<&'static str> {
        vec![VALUE_OUTPUT]
    }

    fn output(self: Arc<Self>, name: &str) -> GraphResult<AnyPort> {
        if name != VALUE_OUTPUT {
            return Err(GraphError::UnknownPort {
                node: self.label(),
                port: name.to_string(),
            });
        }
        let node: NodeRef = Arc::clone(&self) as NodeRef;
        let source: Arc<dyn Source<T>> = self;
        Ok(AnyPort::new(Port::new(VALUE_OUTPUT, node, source)))
    }
}

impl<T> Source<T> for ValueNode<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn read(&self) -> GraphResult<T> {
        Ok(self.value.read().clone())
    }

    fn peek(&self) -> Option<T> {
        Some(self.value.read().clone())
    }
}

impl<T> Clone for Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<T> Debug for Value<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("id", &self.node.id)
            .field("name", &self.node.name)
            .field("value", &self.get())
            .field("version", &self.version())
            .finish()
    }
}

impl<T> Dependency for Value<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        self.port().collect(name, deps);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
