//! Eager Scheduler
//!
//! The scheduler drives a registered set of nodes to a consistent state in
//! one batch. It ensures that dependencies are always processed before their
//! dependents.
//!
//! # Algorithm
//!
//! 1. Registering a root walks its transitive dependencies once and creates
//!    one processing block per distinct node, dependencies first. Each block
//!    subscribes to the alert bus of every node it depends on.
//!
//! 2. An alert with a newer version than the block last processed, or with
//!    state `Stale` or `Error`, marks the block stale. A block that becomes
//!    stale re-alerts its own node's subscribers with `Stale`, so staleness
//!    reaches the bottom of the graph before anything recomputes.
//!
//! 3. `process()` first re-reads every block's dependencies, so inputs
//!    rebound since registration are picked up. It then scans the blocks in
//!    registration order. A stale block is ready once none of its
//!    dependencies' blocks are stale; ready blocks process their node and
//!    record the versions they saw.
//!
//! 4. Passes repeat until nothing is stale. A pass that processes nothing
//!    while blocks are still stale is a deadlock, which only a cycle can
//!    cause.
//!
//! The scheduler drives the same nodes as the lazy evaluator and shares
//! their staleness tracking; reading a port between batches is always safe.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::{DeadlockPolicy, SchedulerConfig};
use crate::error::{GraphError, GraphResult};
use crate::eval::BatchScope;

use super::dependency::Dependencies;
use super::node::{NodeId, NodeRef, NodeState};
use super::port::PortId;
use super::subscription::{Alert, Observer, Subscription};

/// A node whose most recent computation failed during a batch.
#[derive(Debug, Clone)]
pub struct NodeFailure {
    pub node: NodeId,
    pub label: String,
    pub error: Arc<anyhow::Error>,
}

/// Outcome of one [`Scheduler::process`] call.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    /// Scan passes over the blocks.
    pub passes: usize,
    /// Blocks that were stale and got processed.
    pub processed: usize,
    /// Processed blocks whose compute function actually ran.
    pub recomputed: usize,
    pub failures: Vec<NodeFailure>,
}

impl ProcessReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Per-node scheduling state.
struct ProcessingBlock {
    node: NodeRef,
    state: Mutex<BlockState>,
}

struct BlockState {
    stale: bool,
    /// Version of each edge's port as of the last time this block was
    /// processed.
    seen: HashMap<PortId, u64>,
    /// Edges this block already subscribed to.
    subscribed: HashSet<(String, PortId)>,
}

impl ProcessingBlock {
    fn new(node: NodeRef) -> Self {
        Self {
            node,
            state: Mutex::new(BlockState {
                stale: true,
                seen: HashMap::new(),
                subscribed: HashSet::new(),
            }),
        }
    }

    fn is_stale(&self) -> bool {
        self.state.lock().stale
    }

    /// Mark the block stale. On the transition, tell the node's subscribers.
    fn invalidate(&self) {
        let became_stale = !std::mem::replace(&mut self.state.lock().stale, true);
        if became_stale {
            trace!(node = %self.node.id(), "block marked stale");
            self.node
                .alerts()
                .alert(self.node.version(), NodeState::Stale);
        }
    }

    /// Subscribe to every edge not subscribed yet, and invalidate the block
    /// if the ports it reads changed since it was processed.
    fn sync_edges(block: &Arc<Self>, deps: &Dependencies) {
        let mut fresh = Vec::new();
        let changed = {
            let mut state = block.state.lock();
            for edge in deps {
                if state
                    .subscribed
                    .insert((edge.name().to_string(), edge.port()))
                {
                    fresh.push(edge.clone());
                }
            }

            let ports: HashSet<PortId> = deps.iter().map(|edge| edge.port()).collect();
            let seen: HashSet<PortId> = state.seen.keys().copied().collect();
            !state.stale && ports != seen
        };

        for edge in fresh {
            edge.node().add_subscription(Subscription::observe(
                block.node.id(),
                edge.name(),
                block,
            ));
        }
        if changed {
            debug!(node = %block.node.id(), "dependency set changed");
            block.invalidate();
        }
    }

    fn mark_processed(&self) {
        let seen = self
            .node
            .dependencies()
            .iter()
            .map(|edge| (edge.port(), edge.node().version()))
            .collect();

        let mut state = self.state.lock();
        state.stale = false;
        state.seen = seen;
    }
}

impl Observer for ProcessingBlock {
    fn alert(&self, alert: &Alert) {
        let invalidates = {
            let state = self.state.lock();
            let seen = state
                .seen
                .iter()
                .filter(|(port, _)| port.node() == alert.source)
                .map(|(_, &version)| version)
                .min()
                .unwrap_or(0);
            alert.version > seen || alert.state != NodeState::Processed
        };

        if invalidates {
            self.invalidate();
        }
    }
}

/// Batch driver for a set of root nodes and everything they depend on.
///
/// # Example
///
/// ```rust,ignore
/// let mut scheduler = Scheduler::new();
/// scheduler.add_process_node(r2.node());
///
/// scheduler.process()?;
/// times.set(3);
/// let report = scheduler.process()?;
/// assert_eq!(report.recomputed, 2);
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    /// In registration order: every block comes after its dependencies,
    /// except along a cycle.
    blocks: Vec<Arc<ProcessingBlock>>,
    index: HashMap<NodeId, usize>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            blocks: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register `root` and its transitive dependencies. Nodes that are
    /// already registered are skipped.
    ///
    /// Returns the number of newly registered nodes.
    pub fn add_process_node(&mut self, root: NodeRef) -> usize {
        let before = self.blocks.len();
        let mut expanded = HashSet::new();
        let mut stack = vec![(root, false)];

        // Iterative post-order walk: a node is registered once all of its
        // dependencies have been.
        while let Some((node, ready)) = stack.pop() {
            if self.index.contains_key(&node.id()) {
                continue;
            }
            if ready {
                self.register(node);
                continue;
            }
            if !expanded.insert(node.id()) {
                continue;
            }

            let deps = node.dependencies();
            stack.push((node, true));
            for edge in deps.iter().rev() {
                let upstream = edge.node();
                if !self.index.contains_key(&upstream.id()) && !expanded.contains(&upstream.id()) {
                    stack.push((upstream.clone(), false));
                }
            }
        }

        let added = self.blocks.len() - before;
        debug!(added, total = self.blocks.len(), "registered process nodes");
        added
    }

    fn register(&mut self, node: NodeRef) {
        let id = node.id();
        let block = Arc::new(ProcessingBlock::new(node));
        ProcessingBlock::sync_edges(&block, &block.node.dependencies());

        self.index.insert(id, self.blocks.len());
        self.blocks.push(block);
    }

    /// Pick up inputs rebound since registration: register newly reachable
    /// nodes and subscribe to new edges.
    fn sync(&mut self) {
        let mut i = 0;
        while i < self.blocks.len() {
            let block = Arc::clone(&self.blocks[i]);
            let deps = block.node.dependencies();
            for edge in &deps {
                if !self.index.contains_key(&edge.node().id()) {
                    self.add_process_node(edge.node().clone());
                }
            }
            ProcessingBlock::sync_edges(&block, &deps);
            i += 1;
        }
    }

    /// Process every stale block, dependencies first.
    ///
    /// Compute failures are collected in the report. Deadlocks, pass limits
    /// and graph errors abort the batch.
    pub fn process(&mut self) -> GraphResult<ProcessReport> {
        self.sync();
        let _batch = BatchScope::enter();
        let mut report = ProcessReport::default();

        loop {
            let stale = self.stale_labels();
            if stale.is_empty() {
                break;
            }
            if let Some(limit) = self.config.max_passes {
                if report.passes >= limit {
                    warn!(limit, stale = stale.len(), "pass limit reached");
                    return Err(GraphError::PassLimit { limit, stale });
                }
            }
            report.passes += 1;

            let mut progress = 0;
            for block in &self.blocks {
                if !block.is_stale() || !self.is_ready(block) {
                    continue;
                }

                let recomputed = block.node.process()?;
                block.mark_processed();

                progress += 1;
                report.processed += 1;
                if recomputed {
                    report.recomputed += 1;
                }
                if let Some(error) = block.node.last_error() {
                    report.failures.push(NodeFailure {
                        node: block.node.id(),
                        label: block.node.label(),
                        error,
                    });
                }
            }

            if progress == 0 {
                let err = GraphError::Deadlock {
                    passes: report.passes,
                    stale: self.stale_labels(),
                };
                warn!(error = %err, "scheduler deadlocked");
                match self.config.on_deadlock {
                    DeadlockPolicy::Error => return Err(err),
                    DeadlockPolicy::Panic => panic!("{err}"),
                }
            }
        }

        info!(
            passes = report.passes,
            processed = report.processed,
            recomputed = report.recomputed,
            failures = report.failures.len(),
            "batch processed"
        );
        Ok(report)
    }

    fn is_ready(&self, block: &ProcessingBlock) -> bool {
        block
            .node
            .dependencies()
            .iter()
            .all(|edge| match self.index.get(&edge.node().id()) {
                Some(&i) => !self.blocks[i].is_stale(),
                None => true,
            })
    }

    fn stale_labels(&self) -> Vec<String> {
        self.blocks
            .iter()
            .filter(|block| block.is_stale())
            .map(|block| block.node.label())
            .collect()
    }

    /// Whether the block for `id` is stale, or `None` if it is not registered.
    pub fn is_stale(&self, id: NodeId) -> Option<bool> {
        self.index.get(&id).map(|&i| self.blocks[i].is_stale())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn stale_count(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_stale()).count()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("blocks", &self.blocks.len())
            .field("stale", &self.stale_count())
            .finish()
    }
}
