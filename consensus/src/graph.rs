//! Dependency graph — the registry of processing transactions.
//!
//! Each vertex records the transaction handle, its conflict-set handle, the
//! dependencies that are still processing (forward edges) and the
//! transactions waiting on it (reverse edges). Reverse edges are maintained
//! on insertion and removal so a cascade never has to scan the graph.

use crate::conflict_set::SetId;
use snowstorm_types::{Timestamp, TxId};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// A processing transaction and its edges.
#[derive(Clone, Debug)]
pub struct Vertex<T> {
    tx: T,
    set: SetId,
    /// Dependencies not yet accepted.
    pending: BTreeSet<TxId>,
    /// Processing transactions that list this one as a dependency.
    dependents: BTreeSet<TxId>,
    added_at: Timestamp,
}

impl<T> Vertex<T> {
    pub fn tx(&self) -> &T {
        &self.tx
    }

    pub fn set(&self) -> SetId {
        self.set
    }

    pub fn pending_dependencies(&self) -> &BTreeSet<TxId> {
        &self.pending
    }

    pub fn dependents(&self) -> &BTreeSet<TxId> {
        &self.dependents
    }

    pub fn added_at(&self) -> Timestamp {
        self.added_at
    }

    /// Every dependency has been accepted.
    pub fn is_ready(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Registry of every transaction currently under consideration.
#[derive(Clone, Debug)]
pub struct DependencyGraph<T> {
    vertices: HashMap<TxId, Vertex<T>>,
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self {
            vertices: HashMap::new(),
        }
    }
}

impl<T> DependencyGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn get(&self, id: &TxId) -> Option<&Vertex<T>> {
        self.vertices.get(id)
    }

    /// Register a vertex. Every id in `pending` must already be registered.
    pub fn insert(
        &mut self,
        id: TxId,
        tx: T,
        set: SetId,
        pending: BTreeSet<TxId>,
        added_at: Timestamp,
    ) {
        for dep in &pending {
            if let Some(vertex) = self.vertices.get_mut(dep) {
                vertex.dependents.insert(id);
            } else {
                debug_assert!(false, "pending dependency {dep} is not registered");
            }
        }
        self.vertices.insert(
            id,
            Vertex {
                tx,
                set,
                pending,
                dependents: BTreeSet::new(),
                added_at,
            },
        );
    }

    /// Unregister a vertex and drop the reverse edges that pointed at it.
    ///
    /// The removed vertex's own dependents are left untouched; the caller
    /// decides whether they are resolved or rejected.
    pub fn remove(&mut self, id: &TxId) -> Option<Vertex<T>> {
        let vertex = self.vertices.remove(id)?;
        for dep in &vertex.pending {
            if let Some(parent) = self.vertices.get_mut(dep) {
                parent.dependents.remove(id);
            }
        }
        Some(vertex)
    }

    /// Record that `dependency` was accepted. Returns whether `dependent` is
    /// now ready, or `None` if it is not registered.
    pub fn resolve(&mut self, dependent: &TxId, dependency: &TxId) -> Option<bool> {
        let vertex = self.vertices.get_mut(dependent)?;
        vertex.pending.remove(dependency);
        Some(vertex.pending.is_empty())
    }

    /// Whether `tx` depends, directly or transitively, on `ancestor` through
    /// processing edges.
    pub fn depends_on(&self, tx: &TxId, ancestor: &TxId) -> bool {
        if !self.vertices.contains_key(ancestor) {
            return false;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*tx]);
        while let Some(current) = queue.pop_front() {
            let Some(vertex) = self.vertices.get(&current) else {
                continue;
            };
            for dep in &vertex.pending {
                if dep == ancestor {
                    return true;
                }
                if seen.insert(*dep) {
                    queue.push_back(*dep);
                }
            }
        }
        false
    }

    /// Admission time of the longest-processing vertex.
    pub fn oldest(&self) -> Option<Timestamp> {
        self.vertices.values().map(|v| v.added_at).min()
    }
}
