//! Error types for graph construction, evaluation and scheduling.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the graph engine.
///
/// Compute failures are captured on the node that produced them and only
/// surface as [`GraphError::Compute`] when a caller asks for that node's value.
/// Every other variant is fatal to the operation that returned it.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", path.join(" -> "))]
    Cycle {
        /// Node labels along the cycle, starting and ending on the same node.
        path: Vec<String>,
    },

    /// A scheduling pass made no progress while stale nodes remained.
    #[error(
        "stale lock after {passes} pass(es): no processable work while {} node(s) remain stale: {}",
        stale.len(),
        stale.join(", ")
    )]
    Deadlock {
        passes: usize,
        stale: Vec<String>,
    },

    /// The configured pass limit was reached before the batch settled.
    #[error("pass limit of {limit} reached with {} node(s) still stale", stale.len())]
    PassLimit { limit: usize, stale: Vec<String> },

    /// A required input was never bound.
    #[error("node {node} has unset required input '{input}'")]
    MissingInput { node: String, input: String },

    /// An input slot was read before anything was bound to it.
    #[error("input '{input}' is not bound to a port")]
    Unbound { input: String },

    /// The node has no output with the requested name.
    #[error("node {node} has no output port named '{port}'")]
    UnknownPort { node: String, port: String },

    /// A named output was requested with the wrong value type.
    #[error("output port '{port}' of node {node} produces {actual}, but {expected} was requested")]
    TypeMismatch {
        node: String,
        port: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// The node's last computation failed.
    #[error("node {node} failed: {error:#}")]
    Compute {
        node: String,
        error: Arc<anyhow::Error>,
    },

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("node type '{0}' is already registered")]
    DuplicateNodeType(String),

    /// A registered factory rejected its arguments.
    #[error("cannot create node '{node_type}': {message}")]
    Factory { node_type: String, message: String },

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("parameter '{name}' is already defined")]
    DuplicateParameter { name: String },

    #[error("invalid value for parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("producer '{0}' is already defined")]
    DuplicateProducer(String),

    /// Writing a produced artifact failed.
    #[error("failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GraphError {
    /// Returns the captured compute error, if this is a compute failure.
    pub fn compute_error(&self) -> Option<&Arc<anyhow::Error>> {
        match self {
            GraphError::Compute { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Returns `true` for failures that abort the current operation rather
    /// than being captured on a node.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GraphError::Compute { .. })
    }
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_joins_path() {
        let err = GraphError::Cycle {
            path: vec!["a#1".into(), "b#2".into(), "a#1".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: a#1 -> b#2 -> a#1");
        assert!(err.is_fatal());
    }

    #[test]
    fn type_mismatch_names_port_and_types() {
        let err = GraphError::TypeMismatch {
            node: "repeat#4".into(),
            port: "mesh".into(),
            expected: "alloc::string::String",
            actual: "u32",
        };
        let message = err.to_string();
        assert!(message.contains("'mesh'"));
        assert!(message.contains("repeat#4"));
        assert!(message.contains("u32"));
    }

    #[test]
    fn compute_errors_are_not_fatal() {
        let err = GraphError::Compute {
            node: "n#0".into(),
            error: Arc::new(anyhow::anyhow!("bad input")),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.compute_error().map(|e| e.to_string()), Some("bad input".into()));
    }
}
