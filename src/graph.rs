//! Parent/child dependency edges with topological ordering.
//!
//! The graph is built while the owning builder registers nodes and is
//! frozen (shared immutably) once execution starts. Edge containers keep
//! insertion order so sort output and failure tie-breaks are deterministic.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::TaskError;

/// Edge set over opaque node identities.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    parents_of: HashMap<Uuid, Vec<Uuid>>,
    children_of: HashMap<Uuid, Vec<Uuid>>,
    /// Registered node ids; edge maps may hold entries for ids referenced
    /// before registration.
    members: HashSet<Uuid>,
    /// Registration order, used to keep topological ties stable.
    order: Vec<Uuid>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node and its parent edges.
    ///
    /// Fails with `DuplicateNode` if the id is already registered.
    /// Duplicate (parent, child) pairs are no-ops. Parents need not be
    /// registered yet; forward references are resolved by the caller before
    /// sorting. Edges added before the node registers are kept.
    pub fn add_node(&mut self, id: Uuid, parents: &[Uuid]) -> Result<(), TaskError> {
        if !self.members.insert(id) {
            return Err(TaskError::DuplicateNode(id));
        }
        self.parents_of.entry(id).or_default();
        self.children_of.entry(id).or_default();
        self.order.push(id);
        for parent in parents {
            self.add_edge(*parent, id);
        }
        Ok(())
    }

    /// Add a parent -> child edge. Re-adding an existing edge is a no-op.
    pub fn add_edge(&mut self, parent: Uuid, child: Uuid) {
        let parents = self.parents_of.entry(child).or_default();
        if parents.contains(&parent) {
            return;
        }
        parents.push(parent);
        self.children_of.entry(parent).or_default().push(child);
    }

    /// Unwind a failed partial registration (e.g. a duplicate name detected
    /// after edges were added).
    pub fn remove(&mut self, id: Uuid) {
        if let Some(parents) = self.parents_of.remove(&id) {
            for parent in parents {
                if let Some(children) = self.children_of.get_mut(&parent) {
                    children.retain(|child| *child != id);
                }
            }
        }
        if let Some(children) = self.children_of.remove(&id) {
            for child in children {
                if let Some(parents) = self.parents_of.get_mut(&child) {
                    parents.retain(|parent| *parent != id);
                }
            }
        }
        self.members.remove(&id);
        self.order.retain(|node| *node != id);
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.members.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Node ids in registration order.
    pub fn ids(&self) -> &[Uuid] {
        &self.order
    }

    pub fn parents_of(&self, id: Uuid) -> &[Uuid] {
        self.parents_of.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children_of(&self, id: Uuid) -> &[Uuid] {
        self.children_of.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes with no registered parents, in registration order.
    pub fn roots(&self) -> Vec<Uuid> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.parents_of(*id).is_empty())
            .collect()
    }

    /// Kahn's algorithm over the parent relation.
    ///
    /// Every node appears after all of its parents; ties are broken by
    /// registration order. A cycle fails with `Cycle` naming the cycle
    /// participants, not the acyclic nodes merely blocked behind them.
    pub fn topo_sort(&self) -> Result<Vec<Uuid>, TaskError> {
        let mut in_degree: HashMap<Uuid, usize> = self
            .order
            .iter()
            .map(|id| {
                let known_parents = self
                    .parents_of(*id)
                    .iter()
                    .filter(|parent| self.contains(**parent))
                    .count();
                (*id, known_parents)
            })
            .collect();

        let mut queue: std::collections::VecDeque<Uuid> = self
            .order
            .iter()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.order.len());
        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for child in self.children_of(id) {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if sorted.len() != self.order.len() {
            let mut residual: HashSet<Uuid> = self
                .order
                .iter()
                .copied()
                .filter(|id| in_degree[id] > 0)
                .collect();
            // Peel away nodes with no unresolved children; whatever remains
            // sits on a cycle (or between two of them).
            loop {
                let leaves: Vec<Uuid> = residual
                    .iter()
                    .copied()
                    .filter(|id| {
                        self.children_of(*id)
                            .iter()
                            .all(|child| !residual.contains(child))
                    })
                    .collect();
                if leaves.is_empty() {
                    break;
                }
                for id in leaves {
                    residual.remove(&id);
                }
            }
            let cyclic: Vec<Uuid> = self
                .order
                .iter()
                .copied()
                .filter(|id| residual.contains(id))
                .collect();
            return Err(TaskError::Cycle(cyclic));
        }
        Ok(sorted)
    }
}
