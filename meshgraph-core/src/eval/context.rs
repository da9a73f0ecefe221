//! Evaluation Context
//!
//! The evaluation context tracks which nodes are currently being brought up
//! to date on this thread. Re-entering a node that is already on the stack
//! means the graph has a cycle, which would otherwise recurse forever.
//!
//! # Implementation
//!
//! Two thread-local stacks: one for evaluation (`update`/`process`), one for
//! read-only staleness probes. Guards pop their entry on drop, so the stacks
//! stay balanced even if a compute function panics.
//!
//! Nodes brought up to date during an evaluation are remembered until the
//! outermost frame exits, or until the enclosing [`BatchScope`] ends. A
//! compute function reading its inputs then finds them verified instead of
//! walking the graph below them again.
//!
//! Staleness probes do the same: a node found current is not probed again
//! until the outermost probe returns. Without this, a graph that shares
//! upstream nodes is walked once per path.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use crate::error::{GraphError, GraphResult};
use crate::graph::NodeId;

thread_local! {
    static EVAL_STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static PROBE_STACK: RefCell<Vec<NodeId>> = const { RefCell::new(Vec::new()) };
    static VERIFIED: RefCell<HashSet<NodeId>> = RefCell::new(HashSet::new());
    static PROBED_CURRENT: RefCell<HashSet<NodeId>> = RefCell::new(HashSet::new());
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

fn clear_verified_if_idle() {
    let idle = BATCH_DEPTH.with(Cell::get) == 0 && !EvaluationContext::is_active();
    if idle {
        VERIFIED.with(|verified| verified.borrow_mut().clear());
    }
}

/// A node being evaluated.
#[derive(Debug, Clone)]
struct Frame {
    node: NodeId,
    label: String,
}

/// Guard for one node's evaluation. Pops the frame when dropped.
pub struct EvaluationContext {
    node: NodeId,
}

impl EvaluationContext {
    /// Push `node` onto the evaluation stack.
    ///
    /// Fails with [`GraphError::Cycle`] if `node` is already being evaluated;
    /// the path runs from the first occurrence back to `node`.
    pub fn enter(node: NodeId, label: impl FnOnce() -> String) -> GraphResult<Self> {
        EVAL_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();

            if let Some(start) = stack.iter().position(|frame| frame.node == node) {
                let mut path: Vec<String> =
                    stack[start..].iter().map(|frame| frame.label.clone()).collect();
                path.push(stack[start].label.clone());
                return Err(GraphError::Cycle { path });
            }

            stack.push(Frame {
                node,
                label: label(),
            });
            Ok(Self { node })
        })
    }

    /// Check if any node is being evaluated on this thread.
    pub fn is_active() -> bool {
        EVAL_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// The innermost node being evaluated, if any.
    pub fn current() -> Option<NodeId> {
        EVAL_STACK.with(|stack| stack.borrow().last().map(|frame| frame.node))
    }

    pub fn depth() -> usize {
        EVAL_STACK.with(|stack| stack.borrow().len())
    }

    /// Whether `node` was already brought up to date by the evaluation in
    /// progress.
    pub fn is_verified(node: NodeId) -> bool {
        VERIFIED.with(|verified| verified.borrow().contains(&node))
    }

    /// Remember that `node` is up to date until the outermost frame exits.
    pub fn mark_verified(node: NodeId) {
        if Self::is_active() || BATCH_DEPTH.with(Cell::get) > 0 {
            VERIFIED.with(|verified| verified.borrow_mut().insert(node));
        }
    }
}

impl Drop for EvaluationContext {
    fn drop(&mut self) {
        EVAL_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(frame) = popped {
                debug_assert_eq!(
                    frame.node, self.node,
                    "EvaluationContext mismatch: expected {:?}, got {:?}",
                    self.node, frame.node
                );
            }
        });
        clear_verified_if_idle();
    }
}

/// Keeps verified nodes across several top-level evaluations.
///
/// The scheduler holds one for the length of a batch. Nothing may change a
/// value while a scope is open.
pub struct BatchScope {
    _private: (),
}

impl BatchScope {
    pub fn enter() -> Self {
        BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self { _private: () }
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        BATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        clear_verified_if_idle();
    }
}

/// Guard for a read-only staleness check of one node.
pub struct StalenessProbe {
    node: NodeId,
}

impl StalenessProbe {
    /// Returns `None` if `node` is already being probed on this thread.
    pub fn enter(node: NodeId) -> Option<Self> {
        PROBE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&node) {
                return None;
            }
            stack.push(node);
            Some(Self { node })
        })
    }

    /// Whether `node` was found current by the probe in progress.
    pub fn is_current(node: NodeId) -> bool {
        PROBED_CURRENT.with(|current| current.borrow().contains(&node))
    }

    /// Remember that `node` is current until the outermost probe returns.
    pub fn mark_current(node: NodeId) {
        let probing = PROBE_STACK.with(|stack| !stack.borrow().is_empty());
        if probing {
            PROBED_CURRENT.with(|current| current.borrow_mut().insert(node));
        }
    }
}

impl Drop for StalenessProbe {
    fn drop(&mut self) {
        let idle = PROBE_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let popped = stack.pop();
            debug_assert_eq!(popped, Some(self.node), "StalenessProbe mismatch");
            stack.is_empty()
        });
        if idle {
            PROBED_CURRENT.with(|current| current.borrow_mut().clear());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_current_node() {
        let id = NodeId::new();

        assert!(!EvaluationContext::is_active());
        assert!(EvaluationContext::current().is_none());

        {
            let _ctx = EvaluationContext::enter(id, || "a".into()).unwrap();

            assert!(EvaluationContext::is_active());
            assert_eq!(EvaluationContext::current(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!EvaluationContext::is_active());
        assert!(EvaluationContext::current().is_none());
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = EvaluationContext::enter(id1, || "outer".into()).unwrap();
            assert_eq!(EvaluationContext::current(), Some(id1));

            {
                let _ctx2 = EvaluationContext::enter(id2, || "inner".into()).unwrap();
                assert_eq!(EvaluationContext::current(), Some(id2));
                assert_eq!(EvaluationContext::depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(EvaluationContext::current(), Some(id1));
        }

        assert!(EvaluationContext::current().is_none());
    }

    #[test]
    fn reentry_reports_cycle_path() {
        let a = NodeId::new();
        let b = NodeId::new();

        let _ctx_a = EvaluationContext::enter(a, || "a".into()).unwrap();
        let _ctx_b = EvaluationContext::enter(b, || "b".into()).unwrap();

        match EvaluationContext::enter(a, || "a".into()) {
            Err(GraphError::Cycle { path }) => assert_eq!(path, vec!["a", "b", "a"]),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("re-entry should fail"),
        }

        // The failed enter must not leave a frame behind
        assert_eq!(EvaluationContext::depth(), 2);
    }

    #[test]
    fn verified_nodes_reset_with_outermost_frame() {
        let outer = NodeId::new();
        let inner = NodeId::new();

        // Outside an evaluation nothing is remembered
        EvaluationContext::mark_verified(inner);
        assert!(!EvaluationContext::is_verified(inner));

        {
            let _ctx = EvaluationContext::enter(outer, || "outer".into()).unwrap();
            {
                let _ctx = EvaluationContext::enter(inner, || "inner".into()).unwrap();
                EvaluationContext::mark_verified(inner);
            }
            assert!(EvaluationContext::is_verified(inner));
        }

        assert!(!EvaluationContext::is_verified(inner));
    }

    #[test]
    fn batch_scope_keeps_verified_nodes() {
        let node = NodeId::new();
        {
            let _batch = BatchScope::enter();
            {
                let _ctx = EvaluationContext::enter(node, || "node".into()).unwrap();
                EvaluationContext::mark_verified(node);
            }
            assert!(EvaluationContext::is_verified(node));
        }
        assert!(!EvaluationContext::is_verified(node));
    }

    #[test]
    fn probed_nodes_reset_with_outermost_probe() {
        let outer = NodeId::new();
        let inner = NodeId::new();

        StalenessProbe::mark_current(inner);
        assert!(!StalenessProbe::is_current(inner));

        {
            let _outer = StalenessProbe::enter(outer).unwrap();
            {
                let _inner = StalenessProbe::enter(inner).unwrap();
                StalenessProbe::mark_current(inner);
            }
            assert!(StalenessProbe::is_current(inner));
        }

        assert!(!StalenessProbe::is_current(inner));
    }

    #[test]
    fn probe_rejects_reentry() {
        let id = NodeId::new();
        let probe = StalenessProbe::enter(id);
        assert!(probe.is_some());
        assert!(StalenessProbe::enter(id).is_none());
        drop(probe);
        assert!(StalenessProbe::enter(id).is_some());
    }
}
