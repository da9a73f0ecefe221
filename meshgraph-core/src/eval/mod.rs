//! Evaluation
//!
//! This module implements the nodes that hold and compute values: leaf
//! values, derived (cached) computations and closure-based function nodes.
//!
//! # Concepts
//!
//! ## Values
//!
//! A [`Value`] is a container for an externally supplied value, such as a
//! parameter. It has no dependencies. Setting it bumps its version and alerts
//! subscribers.
//!
//! ## Derived Nodes
//!
//! A [`Derived`] node caches the output of a [`Compute`] implementation. It
//! recomputes only when the versions of its declared dependencies differ from
//! the ones it last computed against. Reading a derived port is the lazy
//! evaluator: stale upstream nodes are brought up to date first, depth first.
//!
//! # Implementation Notes
//!
//! Dependencies are declared, not discovered by tracking reads: every
//! [`Compute`] lists its input fields in [`Compute::dependencies`]. The
//! thread-local [`EvaluationContext`] only exists to turn a cyclic read into
//! a [`GraphError::Cycle`](crate::GraphError::Cycle) instead of a stack
//! overflow.

mod context;
mod derived;
pub mod func;
mod value;

pub use context::{BatchScope, EvaluationContext, StalenessProbe};
pub use derived::{Compute, Derived, Outputs, DEFAULT_OUTPUT};
pub use value::{Value, VALUE_OUTPUT};
