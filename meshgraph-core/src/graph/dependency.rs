//! Dependency Discovery
//!
//! Node types declare the upstream ports they consume by listing their input
//! fields once, usually through the [`dependencies!`](crate::dependencies)
//! macro. Every field type that can hold a port implements [`Dependency`],
//! including optional fields, collections and late-bound [`InputSlot`]s.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{GraphError, GraphResult};

use super::node::NodeRef;
use super::port::{Port, PortId};

/// A (consumer, port) edge, named after the input field that holds it.
#[derive(Clone)]
pub struct Edge {
    name: String,
    port: PortId,
    node: NodeRef,
}

impl Edge {
    pub fn new<T: 'static>(name: impl Into<String>, port: &Port<T>) -> Self {
        Self {
            name: name.into(),
            port: port.id(),
            node: port.node().clone(),
        }
    }

    /// Input field name, e.g. `mesh` or `meshes[2]`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    /// The upstream node that owns the port.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("name", &self.name)
            .field("port", &self.port)
            .finish()
    }
}

/// The edges a node consumes, plus any required inputs left unset.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    edges: Vec<Edge>,
    unset: Vec<String>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Record a required input that has nothing bound to it.
    pub fn mark_unset(&mut self, name: impl Into<String>) {
        self.unset.push(name.into());
    }

    /// Collect one input field.
    pub fn with<D: Dependency + ?Sized>(mut self, name: &str, input: &D) -> Self {
        input.collect(name, &mut self);
        self
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Required inputs that were unset when the edges were collected.
    pub fn unset(&self) -> &[String] {
        &self.unset
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Edge> {
        self.edges.iter()
    }
}

impl<'a> IntoIterator for &'a Dependencies {
    type Item = &'a Edge;
    type IntoIter = std::slice::Iter<'a, Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

/// A field that can hold upstream ports.
pub trait Dependency {
    /// Add this field's edges to `deps` under `name`.
    fn collect(&self, name: &str, deps: &mut Dependencies);
}

impl<T: 'static> Dependency for Port<T> {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        deps.push(Edge::new(name, self));
    }
}

impl<D: Dependency> Dependency for Option<D> {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        if let Some(input) = self {
            input.collect(name, deps);
        }
    }
}

impl<D: Dependency> Dependency for [D] {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        for (index, input) in self.iter().enumerate() {
            input.collect(&format!("{name}[{index}]"), deps);
        }
    }
}

impl<D: Dependency, const N: usize> Dependency for [D; N] {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        self.as_slice().collect(name, deps);
    }
}

impl<D: Dependency> Dependency for Vec<D> {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        self.as_slice().collect(name, deps);
    }
}

impl<D: Dependency + ?Sized> Dependency for &D {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        (**self).collect(name, deps);
    }
}

/// Collect the named input fields of a node into [`Dependencies`].
///
/// ```rust,ignore
/// fn dependencies(&self) -> Dependencies {
///     dependencies!(self => mesh, times)
/// }
/// ```
#[macro_export]
macro_rules! dependencies {
    ($owner:expr => $($field:ident),* $(,)?) => {{
        let mut deps = $crate::graph::Dependencies::new();
        $(
            $crate::graph::Dependency::collect(&$owner.$field, stringify!($field), &mut deps);
        )*
        deps
    }};
}

/// An input that is bound to a port after the node is built.
///
/// Clones share the binding. Rebinding changes the owning node's dependency
/// set, which makes it stale.
pub struct InputSlot<T> {
    name: &'static str,
    required: bool,
    port: Arc<RwLock<Option<Port<T>>>>,
}

impl<T: 'static> InputSlot<T> {
    /// A slot that validation reports while it is unset.
    pub fn required(name: &'static str) -> Self {
        Self {
            name,
            required: true,
            port: Arc::new(RwLock::new(None)),
        }
    }

    /// A slot that may stay unset.
    pub fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            port: Arc::new(RwLock::new(None)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn bind(&self, port: Port<T>) {
        *self.port.write() = Some(port);
    }

    /// Remove the binding, returning the previously bound port.
    pub fn unbind(&self) -> Option<Port<T>> {
        self.port.write().take()
    }

    pub fn is_bound(&self) -> bool {
        self.port.read().is_some()
    }

    pub fn port(&self) -> Option<Port<T>> {
        self.port.read().clone()
    }

    /// Read the bound port's value.
    pub fn value(&self) -> GraphResult<T> {
        match self.port() {
            Some(port) => port.value(),
            None => Err(GraphError::Unbound {
                input: self.name.to_string(),
            }),
        }
    }

    /// Read the bound port's value, or `None` when nothing is bound.
    pub fn value_opt(&self) -> GraphResult<Option<T>> {
        self.port().map(|port| port.value()).transpose()
    }
}

impl<T> Clone for InputSlot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            required: self.required,
            port: Arc::clone(&self.port),
        }
    }
}

impl<T: 'static> fmt::Debug for InputSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSlot")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("port", &self.port.read().as_ref().map(|p| p.id()))
            .finish()
    }
}

impl<T: 'static> Dependency for InputSlot<T> {
    fn collect(&self, name: &str, deps: &mut Dependencies) {
        match self.port.read().as_ref() {
            Some(port) => port.collect(name, deps),
            None if self.required => deps.mark_unset(name),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;

    struct Inputs {
        mesh: Port<u32>,
        extra: Option<Port<u32>>,
        parts: Vec<Port<u32>>,
        late: InputSlot<u32>,
    }

    #[test]
    fn collects_nested_and_optional_fields() {
        let a = Value::new(1_u32);
        let b = Value::new(2_u32);
        let c = Value::new(3_u32);

        let inputs = Inputs {
            mesh: a.port(),
            extra: None,
            parts: vec![b.port(), c.port()],
            late: InputSlot::required("late"),
        };

        let deps = dependencies!(inputs => mesh, extra, parts, late);
        let names: Vec<_> = deps.iter().map(|e| e.name().to_string()).collect();

        assert_eq!(names, vec!["mesh", "parts[0]", "parts[1]"]);
        assert_eq!(deps.unset().to_vec(), vec!["late".to_string()]);
        assert_eq!(deps.edges()[1].port(), b.port().id());
    }

    #[test]
    fn bound_slot_becomes_an_edge() {
        let value = Value::new(7_u32);
        let slot = InputSlot::required("input");
        assert!(matches!(slot.value(), Err(GraphError::Unbound { .. })));

        slot.bind(value.port());
        let deps = Dependencies::new().with("input", &slot);
        assert_eq!(deps.len(), 1);
        assert!(deps.unset().is_empty());
        assert_eq!(slot.value().unwrap(), 7);
    }

    #[test]
    fn unset_optional_slot_is_omitted() {
        let slot: InputSlot<u32> = InputSlot::optional("maybe");
        let deps = Dependencies::new().with("maybe", &slot);
        assert!(deps.is_empty());
        assert!(deps.unset().is_empty());
        assert_eq!(slot.value_opt().unwrap(), None);
    }
}
