//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! which node outputs feed which nodes.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are leaf values or derived computations, each with a version
//!   counter and one or more typed output [`Port`]s
//! - Edges are declared by the consuming node: if B reads a port of A, B
//!   lists that port in its [`Dependencies`]
//!
//! There is no central graph object. Each node knows its own edges, and the
//! [`StalenessTracker`] on each derived node decides whether it must
//! recompute by comparing dependency versions.
//!
//! # Design Decisions
//!
//! 1. Ports compare by identity ([`PortId`]), never by value.
//!
//! 2. Staleness is version based. A node recomputes when the versions of
//!    its dependencies differ from the ones it last computed against, so no
//!    dirty flag has to be cleared by hand.
//!
//! 3. The [`Scheduler`] and the [`Topology`] are built on demand from root
//!    nodes. The scheduler keeps forward edges through alert subscriptions;
//!    the topology derives reverse edges for inspection.

mod dependency;
mod node;
mod port;
mod scheduler;
mod subscription;
mod topology;
mod tracker;

pub use dependency::{Dependencies, Dependency, Edge, InputSlot};
pub use node::{Node, NodeId, NodeRef, NodeState};
pub use port::{AnyPort, Port, PortId, Source};
pub use scheduler::{NodeFailure, ProcessReport, Scheduler};
pub use subscription::{Alert, AlertBus, Observer, Subscription, SubscriptionId};
pub use topology::Topology;
pub use tracker::{ObservedVersion, StalenessTracker, VersionSnapshot};
