//! Derived Nodes
//!
//! A [`Derived`] node wraps a [`Compute`] implementation and caches its
//! output. It is the lazy (pull) evaluator.
//!
//! # How Derived Nodes Work
//!
//! 1. Reading a port first brings every dependency up to date, depth first.
//!
//! 2. The node then compares its recorded dependency versions with the
//!    current ones. If they match, the cached value is returned.
//!
//! 3. Otherwise the compute function runs, the snapshot is replaced and the
//!    version goes up by one. Subscribers are alerted.
//!
//! 4. A failing compute function does not propagate through the evaluator.
//!    The error is stored on the node, the version is left alone and the
//!    last good value stays readable through [`Derived::cached`]. The failure
//!    is remembered against the dependency versions it was attempted with, so
//!    it is not retried until something upstream changes.
//!
//! No lock is held while the compute function runs, so it is free to read
//! its input ports.

use std::any::type_name;
use std::fmt::{self, Debug};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::context::{EvaluationContext, StalenessProbe};
use crate::error::{GraphError, GraphResult};
use crate::graph::{
    AlertBus, AnyPort, Dependencies, Dependency, Node, NodeId, NodeRef, NodeState, Port, Source,
    StalenessTracker, VersionSnapshot,
};

/// Output name of a derived node's whole value.
pub const DEFAULT_OUTPUT: &str = "out";

/// The computation behind a derived node.
///
/// Implementors hold their inputs as ports (or slots) and list them in
/// [`Compute::dependencies`], usually with the
/// [`dependencies!`](crate::dependencies) macro.
pub trait Compute: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    /// Node type name used in diagnostics.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// The upstream ports this computation reads.
    fn dependencies(&self) -> Dependencies;

    /// Produce the output from the current input values.
    fn compute(&self) -> anyhow::Result<Self::Output>;

    /// Named ports exposing parts of the output, in addition to
    /// [`DEFAULT_OUTPUT`].
    fn outputs(&self) -> Outputs<Self::Output> {
        Outputs::new()
    }
}

/// `a::b::Repeat<c::Mesh>` -> `Repeat<c::Mesh>`
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(index) => &full[index + 2..],
        None => full,
    }
}

type PortFactory<T> = Box<dyn Fn(NodeRef, Arc<dyn Source<T>>) -> AnyPort + Send + Sync>;

/// Named output ports of a derived node.
pub struct Outputs<T> {
    ports: IndexMap<&'static str, PortFactory<T>>,
}

impl<T> Outputs<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            ports: IndexMap::new(),
        }
    }

    /// Expose `extract(output)` as the port `name`.
    pub fn with<U, F>(mut self, name: &'static str, extract: F) -> Self
    where
        U: Send + Sync + 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let extract = Arc::new(extract);
        self.ports.insert(
            name,
            Box::new(move |node: NodeRef, source: Arc<dyn Source<T>>| {
                let extract = Arc::clone(&extract);
                let whole = Port::new(DEFAULT_OUTPUT, node, source);
                AnyPort::new(whole.project(name, move |value: &T| (*extract)(value)))
            }),
        );
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ports.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl<T> Default for Outputs<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// A cached computation in the graph.
///
/// Clones share the same node.
pub struct Derived<C: Compute> {
    node: Arc<DerivedNode<C>>,
}

struct DerivedNode<C: Compute> {
    id: NodeId,
    compute: C,
    outputs: Outputs<C::Output>,
    cell: Mutex<Cell<C::Output>>,
    alerts: AlertBus,
}

struct Cell<T> {
    value: Option<T>,
    tracker: StalenessTracker,
    failure: Option<Failure>,
    computations: u64,
}

struct Failure {
    attempted: VersionSnapshot,
    error: Arc<anyhow::Error>,
}

impl<T> Cell<T> {
    fn needs_compute(&self, current: &VersionSnapshot) -> bool {
        match &self.failure {
            Some(failure) => failure.attempted != *current,
            None => self.tracker.outdated(current),
        }
    }
}

impl<C: Compute> Derived<C> {
    /// Create a new derived node. Nothing is computed until it is read.
    pub fn new(compute: C) -> Self {
        let id = NodeId::new();
        let outputs = compute.outputs();
        Self {
            node: Arc::new(DerivedNode {
                id,
                compute,
                outputs,
                cell: Mutex::new(Cell {
                    value: None,
                    tracker: StalenessTracker::new(),
                    failure: None,
                    computations: 0,
                }),
                alerts: AlertBus::new(id),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    pub fn name(&self) -> &str {
        self.node.compute.name()
    }

    /// Number of successful recomputations.
    pub fn version(&self) -> u64 {
        self.node.cell.lock().tracker.version()
    }

    pub fn state(&self) -> NodeState {
        self.node.state()
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Recursion depth follows the longest stale path upstream; see
    /// [`Port::value`].
    pub fn value(&self) -> GraphResult<C::Output> {
        self.node.read()
    }

    /// The cached value without recomputing. After a failure this is the last
    /// value that computed successfully.
    pub fn cached(&self) -> Option<C::Output> {
        self.node.peek()
    }

    pub fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        self.node.last_error()
    }

    /// How many times the compute function has run, failures included.
    pub fn computations(&self) -> u64 {
        self.node.cell.lock().computations
    }

    /// The wrapped computation.
    pub fn compute(&self) -> &C {
        &self.node.compute
    }

    /// The port exposing the whole output.
    pub fn port(&self) -> Port<C::Output> {
        Port::new(
            DEFAULT_OUTPUT,
            self.node(),
            Arc::clone(&self.node) as Arc<dyn Source<C::Output>>,
        )
    }

    /// A named output port, type-checked against `U`.
    pub fn output<U: 'static>(&self, name: &str) -> GraphResult<Port<U>> {
        self.node().output(name)?.downcast::<U>()
    }

    /// Type-erased handle to the node.
    pub fn node(&self) -> NodeRef {
        Arc::clone(&self.node) as NodeRef
    }
}

impl<C: Compute> DerivedNode<C> {
    /// Bring the node up to date. With `recursive`, dependencies are updated
    /// first; otherwise they are assumed current.
    fn refresh(&self, recursive: bool) -> GraphResult<bool> {
        if EvaluationContext::is_verified(self.id) {
            return Ok(false);
        }
        let _frame = EvaluationContext::enter(self.id, || self.label())?;

        let deps = self.compute.dependencies();
        if recursive {
            for edge in &deps {
                edge.node().update()?;
            }
        }

        let current = VersionSnapshot::capture(&deps);
        let computed = if self.cell.lock().needs_compute(&current) {
            self.recompute(current);
            true
        } else {
            trace!(node = %self.id, name = self.compute.name(), "up to date");
            false
        };

        EvaluationContext::mark_verified(self.id);
        Ok(computed)
    }

    fn recompute(&self, current: VersionSnapshot) {
        let result = self.compute.compute();

        let (version, state) = {
            let mut cell = self.cell.lock();
            cell.computations += 1;

            match result {
                Ok(value) => {
                    cell.value = Some(value);
                    cell.failure = None;
                    let version = cell.tracker.record(current);
                    debug!(node = %self.id, name = self.compute.name(), version, "recomputed");
                    (version, NodeState::Processed)
                }
                Err(error) => {
                    warn!(
                        node = %self.id,
                        name = self.compute.name(),
                        error = %format!("{error:#}"),
                        "compute failed"
                    );
                    cell.failure = Some(Failure {
                        attempted: current,
                        error: Arc::new(error),
                    });
                    (cell.tracker.version(), NodeState::Error)
                }
            }
        };

        self.alerts.alert(version, state);
    }
}

impl<C: Compute> Node for DerivedNode<C> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        self.compute.name()
    }

    fn version(&self) -> u64 {
        self.cell.lock().tracker.version()
    }

    fn outdated(&self) -> bool {
        if StalenessProbe::is_current(self.id) {
            return false;
        }
        // Already being probed further up: a cycle, which is never current.
        let Some(_probe) = StalenessProbe::enter(self.id) else {
            return true;
        };

        let deps = self.compute.dependencies();
        let current = VersionSnapshot::capture(&deps);
        if self.cell.lock().needs_compute(&current) {
            return true;
        }
        if deps.iter().any(|edge| edge.node().outdated()) {
            return true;
        }
        StalenessProbe::mark_current(self.id);
        false
    }

    fn failed(&self) -> bool {
        self.cell.lock().failure.is_some()
    }

    fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        self.cell
            .lock()
            .failure
            .as_ref()
            .map(|failure| Arc::clone(&failure.error))
    }

    fn dependencies(&self) -> Dependencies {
        self.compute.dependencies()
    }

    fn update(&self) -> GraphResult<bool> {
        self.refresh(true)
    }

    fn process(&self) -> GraphResult<bool> {
        self.refresh(false)
    }

    fn alerts(&self) -> &AlertBus {
        &self.alerts
    }

    fn output_names(&self) -> Vec<&'static str> {
        std::iter::once(DEFAULT_OUTPUT)
            .chain(self.outputs.names())
            .collect()
    }

    fn output(self: Arc<Self>, name: &str) -> GraphResult<AnyPort> {
        let node: NodeRef = Arc::clone(&self) as NodeRef;
        if name == DEFAULT_OUTPUT {
            let source: Arc<dyn Source<C::Output>> = self;
            return Ok(AnyPort::new(Port::new(DEFAULT_OUTPUT, node, source)));
        }

        match self.outputs.ports.get(name) {
            Some(factory) => {
                let source: Arc<dyn Source<C::Output>> = Arc::clone(&self) as _;
                Ok(factory(node, source))
            }
            None => Err(GraphError::UnknownPort {
                node: self.label(),
                port: name.to_string(),
            }),
        }
    }
}

impl<C: Compute> Source<C::Output> for DerivedNode<C> {
    fn read(&self) -> GraphResult<C::Output> {
        self.refresh(true)?;

        let cell = self.cell.lock();
        if let Some(failure) = &cell.failure {
            return Err(GraphError::Compute {
                node: self.label(),
                error: Arc::clone(&failure.error),
            });
        }
        cell.value.clone().ok_or_else(|| GraphError::Compute {
            node: self.label(),
            error: Arc::new(anyhow::anyhow!("node has no value after computing")),
        })
    }

    fn peek(&self) -> Option<C::Output> {
        self.cell.lock().value.clone()
    }
}

impl<C: Compute> Clone for Derived<C> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<C: Compute> Debug for Derived<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.node.cell.lock();
        f.debug_struct("Derived")
            .field("id", &self.node.id)
            .field("name", &self.node.compute.name())
            .field("version", &cell.tracker.version())
            .field("has_value", &cell.value.is_some())
            .field("failed", &cell.failure.is_some())
            .finish()
    }
}

impl<C: Compute> Dependency for Derived<C> {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        self.port().collect(name, deps);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
