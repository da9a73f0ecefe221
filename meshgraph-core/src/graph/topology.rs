//! Topology
//!
//! A snapshot of the graph reachable from a set of roots, used to check a
//! graph before it runs and to inspect its shape.
//!
//! The snapshot reflects the dependency sets at the time it was taken.
//! Rebinding an [`InputSlot`](super::InputSlot) afterwards is not seen.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::error::{GraphError, GraphResult};

use super::node::{NodeId, NodeRef};

struct Entry {
    node: NodeRef,
    /// Distinct upstream nodes, in edge order.
    dependencies: Vec<NodeId>,
    /// Required inputs left unset.
    unset: Vec<String>,
}

/// The nodes reachable from a set of roots, in discovery order.
pub struct Topology {
    entries: IndexMap<NodeId, Entry>,
}

impl Topology {
    /// Walk every node reachable from `roots`.
    pub fn from_roots<I>(roots: I) -> Self
    where
        I: IntoIterator<Item = NodeRef>,
    {
        let mut entries = IndexMap::new();
        let mut queue: VecDeque<NodeRef> = roots.into_iter().collect();

        while let Some(node) = queue.pop_front() {
            if entries.contains_key(&node.id()) {
                continue;
            }

            let deps = node.dependencies();
            let mut seen = HashSet::new();
            let mut dependencies = Vec::new();
            for edge in &deps {
                let upstream = edge.node();
                if seen.insert(upstream.id()) {
                    dependencies.push(upstream.id());
                    queue.push_back(upstream.clone());
                }
            }

            entries.insert(
                node.id(),
                Entry {
                    node,
                    dependencies,
                    unset: deps.unset().to_vec(),
                },
            );
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeRef> {
        self.entries.get(&id).map(|entry| &entry.node)
    }

    /// All nodes, in discovery order (roots first).
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRef> + '_ {
        self.entries.values().map(|entry| &entry.node)
    }

    /// Distinct direct dependencies of `id`.
    pub fn dependencies(&self, id: NodeId) -> &[NodeId] {
        self.entries
            .get(&id)
            .map(|entry| entry.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Direct dependents of `id` within this snapshot.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.dependencies.contains(&id))
            .map(|(&dependent, _)| dependent)
            .collect()
    }

    /// Order the nodes so every node comes after its dependencies.
    ///
    /// Fails with [`GraphError::Cycle`] if the graph is not acyclic.
    pub fn topological_order(&self) -> GraphResult<Vec<NodeRef>> {
        let mut dependents: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        for (&id, entry) in &self.entries {
            for &dep in &entry.dependencies {
                dependents.entry(dep).or_default().push(id);
            }
            in_degree.insert(id, entry.dependencies.len());
        }

        // Leaves first, in reverse discovery order so the result reads
        // upstream to downstream.
        for (&id, entry) in self.entries.iter().rev() {
            if entry.dependencies.is_empty() {
                queue.push_back(id);
            }
        }

        // Kahn's algorithm
        let mut result = Vec::with_capacity(self.entries.len());
        while let Some(id) = queue.pop_front() {
            if let Some(entry) = self.entries.get(&id) {
                result.push(entry.node.clone());
            }

            for &dependent in dependents.get(&id).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if result.len() == self.entries.len() {
            return Ok(result);
        }

        let remaining: HashSet<NodeId> = in_degree
            .into_iter()
            .filter(|&(_, degree)| degree > 0)
            .map(|(id, _)| id)
            .collect();
        Err(GraphError::Cycle {
            path: self.cycle_path(&remaining),
        })
    }

    /// Follow unresolved dependencies until a node repeats.
    fn cycle_path(&self, remaining: &HashSet<NodeId>) -> Vec<String> {
        let Some(start) = self
            .entries
            .keys()
            .copied()
            .find(|id| remaining.contains(id))
        else {
            return Vec::new();
        };

        let mut walk: Vec<NodeId> = Vec::new();
        let mut current = start;
        loop {
            if let Some(position) = walk.iter().position(|&id| id == current) {
                let mut path: Vec<String> =
                    walk[position..].iter().map(|&id| self.label(id)).collect();
                path.push(self.label(current));
                return path;
            }
            walk.push(current);

            let next = self
                .dependencies(current)
                .iter()
                .copied()
                .find(|id| remaining.contains(id));
            match next {
                Some(next) => current = next,
                None => return walk.iter().map(|&id| self.label(id)).collect(),
            }
        }
    }

    fn label(&self, id: NodeId) -> String {
        self.node(id)
            .map(|node| node.label())
            .unwrap_or_else(|| id.to_string())
    }

    /// Check that every required input is bound and the graph is acyclic.
    pub fn validate(&self) -> GraphResult<()> {
        for entry in self.entries.values() {
            if let Some(input) = entry.unset.first() {
                return Err(GraphError::MissingInput {
                    node: entry.node.label(),
                    input: input.clone(),
                });
            }
        }
        self.topological_order().map(|_| ())
    }
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.entries
                    .iter()
                    .map(|(id, entry)| (id, &entry.dependencies)),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependencies;
    use crate::eval::{func, Compute, Derived, Value};
    use crate::graph::{Dependencies, InputSlot};

    struct Relay {
        input: InputSlot<i32>,
    }

    impl Compute for Relay {
        type Output = i32;

        fn dependencies(&self) -> Dependencies {
            dependencies!(self => input)
        }

        fn compute(&self) -> anyhow::Result<i32> {
            Ok(self.input.value()? + 1)
        }
    }

    #[test]
    fn orders_dependencies_first() {
        let a = Value::named("a", 1);
        let b = func::map("b", a.port(), |x| x + 1);
        let c = func::map2("c", a.port(), b.port(), |x, y| x + y);

        let topology = Topology::from_roots([c.node()]);
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.dependencies(c.id()), &[a.id(), b.id()]);
        assert_eq!(topology.dependents(a.id()), vec![c.id(), b.id()]);

        let order: Vec<_> = topology
            .topological_order()
            .unwrap()
            .iter()
            .map(|node| node.id())
            .collect();
        assert_eq!(order, vec![a.id(), b.id(), c.id()]);
        assert!(topology.validate().is_ok());
    }

    #[test]
    fn duplicate_edges_count_once() {
        let a = Value::new(2);
        let square = func::map2("square", a.port(), a.port(), |x, y| x * y);

        let topology = Topology::from_roots([square.node()]);
        assert_eq!(topology.dependencies(square.id()), &[a.id()]);
        assert_eq!(topology.topological_order().unwrap().len(), 2);
    }

    #[test]
    fn reports_cycle_path() {
        let first = Derived::new(Relay {
            input: InputSlot::required("input"),
        });
        let second = Derived::new(Relay {
            input: InputSlot::required("input"),
        });
        first.compute().input.bind(second.port());
        second.compute().input.bind(first.port());

        let topology = Topology::from_roots([first.node()]);
        match topology.validate() {
            Err(GraphError::Cycle { path }) => {
                assert_eq!(path.len(), 3);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn reports_unset_required_input() {
        let relay = Derived::new(Relay {
            input: InputSlot::required("input"),
        });

        let err = Topology::from_roots([relay.node()]).validate().unwrap_err();
        assert!(matches!(err, GraphError::MissingInput { ref input, .. } if input == "input"));
    }
}
