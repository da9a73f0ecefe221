//! Meshgraph Core
//!
//! This crate provides the incremental computation graph behind the meshgraph
//! procedural content toolkit. Node graphs produce meshes, textures and scene
//! files; this crate decides what has to be recomputed when an upstream value
//! changes. It implements:
//!
//! - Leaf values and cached derived nodes with version-based staleness
//! - Lazy (pull) evaluation through [`Port::value`](graph::Port::value)
//! - Eager (push) batch evaluation through the [`Scheduler`](graph::Scheduler)
//! - Build-time validation of the graph shape
//! - Parameters, producers and an application shell that writes outputs
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node identity, ports, dependency discovery, staleness tracking,
//!   alert subscriptions, topology and the scheduler
//! - `eval`: Value nodes, derived nodes and closure-based function nodes
//! - `params`: Named parameters backed by value nodes
//! - `app`: Producers and the application shell
//! - `registry`: Node type registry
//! - `config`: Scheduler configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use meshgraph_core::eval::{func, Value};
//!
//! // A leaf value
//! let times = Value::named("times", 5);
//!
//! // Derived nodes
//! let r1 = func::map("repeat", times.port(), |n| vec!["cube"; n]);
//! let r2 = func::map("repeat", r1.port(), |parts| parts.repeat(5));
//!
//! // Reading computes r1, then r2
//! assert_eq!(r2.value()?.len(), 25);
//!
//! // Changing the value makes both stale; the next read recomputes each once
//! times.set(3);
//! assert_eq!(r2.value()?.len(), 15);
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod eval;
pub mod graph;
pub mod params;
pub mod registry;

pub use app::{App, Artifact, Producer, RunReport};
pub use config::{DeadlockPolicy, SchedulerConfig};
pub use error::{GraphError, GraphResult};
pub use eval::{Compute, Derived, Value};
pub use graph::{Dependencies, InputSlot, NodeState, Port, Scheduler};
pub use params::ParameterSet;
pub use registry::NodeRegistry;
