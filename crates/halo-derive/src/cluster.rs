//! Union-find over relationship edges for network clustering

use std::collections::HashMap;

use uuid::Uuid;

/// Disjoint-set forest keyed by entity id
pub struct UnionFind {
    parent: HashMap<Uuid, Uuid>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self {
            parent: HashMap::new(),
        }
    }

    pub fn find(&mut self, id: Uuid) -> Uuid {
        let parent = *self.parent.entry(id).or_insert(id);
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.parent.insert(id, root);
        root
    }

    pub fn union(&mut self, a: Uuid, b: Uuid) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_a, root_b);
        }
    }

    /// Components keyed by their smallest member id, which makes cluster
    /// ids stable across runs
    pub fn components(&mut self) -> HashMap<Uuid, Vec<Uuid>> {
        let ids: Vec<Uuid> = self.parent.keys().copied().collect();
        let mut by_root: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for id in ids {
            let root = self.find(id);
            by_root.entry(root).or_default().push(id);
        }

        let mut components = HashMap::new();
        for (_, mut members) in by_root {
            members.sort();
            components.insert(members[0], members);
        }
        components
    }
}

impl Default for UnionFind {
    fn default() -> Self {
        Self::new()
    }
}
