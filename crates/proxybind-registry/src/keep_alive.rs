//! KeepAliveGraph - "nurse keeps patient alive" edges.
//!
//! Both ends are managed objects, stored as codec-encoded keys. The graph
//! only records edges; taking and releasing the reference each edge holds on
//! its patient is the caller's job, since that can re-enter the runtime.

use rustc_hash::{FxHashMap, FxHashSet};

use proxybind_core::{ObjectHandle, PtrKey};

/// Dependency sets, one per nurse.
#[derive(Debug, Default)]
pub struct KeepAliveGraph {
    edges: FxHashMap<PtrKey, FxHashSet<PtrKey>>,
}

impl KeepAliveGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `patient` to the dependency set of `nurse`.
    ///
    /// Returns false if the edge already existed.
    pub fn link(&mut self, nurse: ObjectHandle, patient: ObjectHandle) -> bool {
        let inserted = self
            .edges
            .entry(PtrKey::from_handle(nurse))
            .or_default()
            .insert(PtrKey::from_handle(patient));
        if inserted {
            log::trace!("keep-alive {:?} -> {:?}", nurse, patient);
        }
        inserted
    }

    /// Remove the whole dependency set of `nurse`.
    ///
    /// Returns None if the nurse has no set.
    pub fn clear(&mut self, nurse: ObjectHandle) -> Option<Vec<ObjectHandle>> {
        let set = self.edges.remove(&PtrKey::from_handle(nurse))?;
        Some(set.into_iter().map(PtrKey::to_handle).collect())
    }

    /// Patients currently kept alive by `nurse`.
    pub fn patients_of(&self, nurse: ObjectHandle) -> Vec<ObjectHandle> {
        self.edges
            .get(&PtrKey::from_handle(nurse))
            .map(|set| set.iter().map(|key| key.to_handle()).collect())
            .unwrap_or_default()
    }

    /// Check if `nurse` keeps `patient` alive.
    pub fn contains(&self, nurse: ObjectHandle, patient: ObjectHandle) -> bool {
        self.edges
            .get(&PtrKey::from_handle(nurse))
            .is_some_and(|set| set.contains(&PtrKey::from_handle(patient)))
    }

    /// Number of nurses with at least one set.
    pub fn nurse_count(&self) -> usize {
        self.edges.len()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(FxHashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_is_idempotent() {
        let mut graph = KeepAliveGraph::new();
        let nurse = ObjectHandle::new(1, 0);
        let patient = ObjectHandle::new(2, 0);

        assert!(graph.link(nurse, patient));
        assert!(!graph.link(nurse, patient));
        assert_eq!(graph.edge_count(), 1);
        assert!(graph.contains(nurse, patient));
        assert!(!graph.contains(patient, nurse));
    }

    #[test]
    fn clear_returns_all_patients() {
        let mut graph = KeepAliveGraph::new();
        let nurse = ObjectHandle::new(1, 0);
        let a = ObjectHandle::new(2, 5);
        let b = ObjectHandle::new(3, 0);
        graph.link(nurse, a);
        graph.link(nurse, b);

        let mut patients = graph.clear(nurse).unwrap();
        patients.sort_by_key(|h| h.index);
        assert_eq!(patients, vec![a, b]);
        assert_eq!(graph.nurse_count(), 0);
        assert!(graph.clear(nurse).is_none());
    }

    #[test]
    fn nurses_are_independent() {
        let mut graph = KeepAliveGraph::new();
        let n1 = ObjectHandle::new(1, 0);
        let n2 = ObjectHandle::new(2, 0);
        let patient = ObjectHandle::new(3, 0);
        graph.link(n1, patient);
        graph.link(n2, patient);

        graph.clear(n1);
        assert_eq!(graph.patients_of(n2), vec![patient]);
        assert!(graph.patients_of(n1).is_empty());
    }
}
