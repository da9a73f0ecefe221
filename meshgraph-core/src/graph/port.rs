//! Ports
//!
//! A [`Port`] is one typed output of a node. Ports are compared by identity
//! ([`PortId`]), never by value, so they can key dependency snapshots.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};

use super::node::{NodeId, NodeRef, NodeState};

/// Identity of a port: the owning node plus the output name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortId {
    node: NodeId,
    output: &'static str,
}

impl PortId {
    pub fn new(node: NodeId, output: &'static str) -> Self {
        Self { node, output }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn output(&self) -> &'static str {
        self.output
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.output)
    }
}

/// Typed read access behind a port.
pub trait Source<T>: Send + Sync {
    /// Read the value, forcing computation if the owner is stale.
    fn read(&self) -> GraphResult<T>;

    /// The cached value without forcing computation. For a failed node this is
    /// the last value that computed successfully.
    fn peek(&self) -> Option<T>;
}

/// A typed output of a node.
pub struct Port<T> {
    id: PortId,
    node: NodeRef,
    source: Arc<dyn Source<T>>,
}

impl<T: 'static> Port<T> {
    /// Create a port named `output` on `node`, reading through `source`.
    pub fn new(output: &'static str, node: NodeRef, source: Arc<dyn Source<T>>) -> Self {
        Self {
            id: PortId::new(node.id(), output),
            node,
            source,
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    /// The node that owns this port.
    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// `node.output`, used in diagnostics.
    pub fn label(&self) -> String {
        format!("{}.{}", self.node.label(), self.id.output)
    }

    /// The owning node's current version. Never forces computation.
    pub fn version(&self) -> u64 {
        self.node.version()
    }

    /// The owning node's current state. Never forces computation.
    pub fn state(&self) -> NodeState {
        self.node.state()
    }

    /// Read the value, recomputing anything stale upstream first.
    ///
    /// The upstream graph is walked recursively, one stack frame per link,
    /// so a chain many thousands of nodes deep can overflow the thread's
    /// stack. Drive deep graphs with a [`Scheduler`](crate::graph::Scheduler),
    /// which processes one node at a time, and read them with
    /// [`cached`](Self::cached).
    pub fn value(&self) -> GraphResult<T> {
        self.source.read()
    }

    /// The cached value, without forcing computation.
    pub fn cached(&self) -> Option<T> {
        self.source.peek()
    }

    /// A port on the same node that exposes part of this port's value.
    pub fn project<U, F>(&self, output: &'static str, extract: F) -> Port<U>
    where
        U: 'static,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let source = Projection {
            parent: Arc::clone(&self.source),
            extract,
            _marker: PhantomData,
        };
        Port::new(output, Arc::clone(&self.node), Arc::new(source))
    }
}

impl<T> Clone for Port<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            node: Arc::clone(&self.node),
            source: Arc::clone(&self.source),
        }
    }
}

impl<T> PartialEq for Port<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Port<T> {}

impl<T> fmt::Debug for Port<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port")
            .field("id", &self.id)
            .field("node", &self.node.name())
            .field("version", &self.node.version())
            .finish()
    }
}

/// Reads a parent source and maps the result.
struct Projection<S, U, F> {
    parent: Arc<dyn Source<S>>,
    extract: F,
    _marker: PhantomData<fn() -> U>,
}

impl<S, U, F> Source<U> for Projection<S, U, F>
where
    F: Fn(&S) -> U + Send + Sync,
{
    fn read(&self) -> GraphResult<U> {
        self.parent.read().map(|value| (self.extract)(&value))
    }

    fn peek(&self) -> Option<U> {
        self.parent.peek().map(|value| (self.extract)(&value))
    }
}

/// A port whose value type has been erased.
///
/// Returned by [`Node::output`](super::Node::output); recover the typed port
/// with [`AnyPort::downcast`].
pub struct AnyPort {
    id: PortId,
    node: NodeRef,
    type_name: &'static str,
    port: Box<dyn Any + Send + Sync>,
}

impl AnyPort {
    pub fn new<T: 'static>(port: Port<T>) -> Self {
        Self {
            id: port.id(),
            node: Arc::clone(port.node()),
            type_name: std::any::type_name::<T>(),
            port: Box::new(port),
        }
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    /// Name of the value type this port produces.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Recover the typed port, failing if `T` is not the port's value type.
    pub fn downcast<T: 'static>(self) -> GraphResult<Port<T>> {
        let Self {
            id,
            node,
            type_name,
            port,
        } = self;
        port.downcast::<Port<T>>()
            .map(|port| *port)
            .map_err(|_| GraphError::TypeMismatch {
                node: node.label(),
                port: id.output().to_string(),
                expected: std::any::type_name::<T>(),
                actual: type_name,
            })
    }
}

impl fmt::Debug for AnyPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyPort")
            .field("id", &self.id)
            .field("type", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;

    #[test]
    fn ports_compare_by_identity() {
        let a = Value::new(1);
        let b = Value::new(1);

        assert_eq!(a.port(), a.port());
        assert_ne!(a.port(), b.port());
    }

    #[test]
    fn projection_shares_owner_version() {
        let pair = Value::new((2_u32, "two".to_string()));
        let first = pair.port().project("first", |p: &(u32, String)| p.0);

        assert_eq!(first.value().unwrap(), 2);
        assert_eq!(first.id().node(), pair.id());
        assert_eq!(first.id().output(), "first");

        pair.set((3, "three".into()));
        assert_eq!(first.version(), pair.version());
        assert_eq!(first.value().unwrap(), 3);
    }

    #[test]
    fn downcast_to_wrong_type_names_the_port() {
        let value = Value::named("times", 5_usize);
        let any = AnyPort::new(value.port());

        let err = any.downcast::<String>().unwrap_err();
        match err {
            GraphError::TypeMismatch {
                port,
                expected,
                actual,
                ..
            } => {
                assert_eq!(port, "value");
                assert_eq!(expected, std::any::type_name::<String>());
                assert_eq!(actual, "usize");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn downcast_to_right_type_keeps_identity() {
        let value = Value::new(5_usize);
        let any = AnyPort::new(value.port());
        let port = any.downcast::<usize>().unwrap();
        assert_eq!(port, value.port());
    }
}
