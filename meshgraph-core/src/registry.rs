//! Node Registry
//!
//! The registry maps node type names to factories. It is owned by the
//! application, so there is no global state and iteration order is the
//! order types were registered in.
//!
//! # How It Works
//!
//! 1. Each node type registers once, with a description and a factory that
//!    builds a node from JSON arguments.
//!
//! 2. `create` looks the type up and runs its factory. Factory errors are
//!    reported as [`GraphError::Factory`] naming the type.
//!
//! 3. Created nodes are type-erased; recover typed ports through
//!    [`Node::output`](crate::graph::Node::output) and
//!    [`AnyPort::downcast`](crate::graph::AnyPort::downcast).

use std::fmt;

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::graph::NodeRef;

/// Builds a node from its JSON arguments.
pub type NodeFactory = Box<dyn Fn(&serde_json::Value) -> anyhow::Result<NodeRef> + Send + Sync>;

struct Registration {
    description: String,
    factory: NodeFactory,
}

/// Name to factory mapping for node types.
#[derive(Default)]
pub struct NodeRegistry {
    types: IndexMap<String, Registration>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type.
    ///
    /// Fails with [`GraphError::DuplicateNodeType`] if `name` is taken.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        factory: F,
    ) -> GraphResult<()>
    where
        F: Fn(&serde_json::Value) -> anyhow::Result<NodeRef> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.types.contains_key(&name) {
            return Err(GraphError::DuplicateNodeType(name));
        }

        debug!(node_type = %name, "node type registered");
        self.types.insert(
            name,
            Registration {
                description: description.into(),
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Build a node of type `name`.
    pub fn create(&self, name: &str, args: &serde_json::Value) -> GraphResult<NodeRef> {
        let registration = self
            .types
            .get(name)
            .ok_or_else(|| GraphError::UnknownNodeType(name.to_string()))?;

        (registration.factory)(args).map_err(|e| GraphError::Factory {
            node_type: name.to_string(),
            message: format!("{e:#}"),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered type names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.keys().map(String::as_str)
    }

    pub fn describe(&self, name: &str) -> Option<&str> {
        self.types
            .get(name)
            .map(|registration| registration.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types.keys()).finish()
    }
}
