//! Monotonic merge structure for iterative clustering rounds (spec §4.I:
//! "clusters merge monotonically — a pair once joined is never split
//! again").
//!
//! Generalized from the teacher's `task::tree::{find_similar_tasks,
//! merge_task_cluster}` pairwise-merge shape into a disjoint-set over
//! finding ids, so that repeated rounds only ever coarsen the partition.

use std::collections::HashMap;
use uuid::Uuid;

pub struct DisjointSet {
    parent: HashMap<Uuid, Uuid>,
}

impl DisjointSet {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self { parent: ids.into_iter().map(|id| (id, id)).collect() }
    }

    pub fn find(&mut self, id: Uuid) -> Uuid {
        let parent = *self.parent.get(&id).unwrap_or(&id);
        if parent == id {
            return id;
        }
        let root = self.find(parent);
        self.parent.insert(id, root);
        root
    }

    /// Join the sets containing `a` and `b`. Once joined, no later call can
    /// separate them — the monotonicity invariant is structural, not a
    /// policy this type has to enforce.
    pub fn union(&mut self, a: Uuid, b: Uuid) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_a, root_b);
        }
    }

    /// Final groups, keyed by root id.
    pub fn groups(&mut self) -> HashMap<Uuid, Vec<Uuid>> {
        let ids: Vec<Uuid> = self.parent.keys().copied().collect();
        let mut groups: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for id in ids {
            let root = self.find(id);
            groups.entry(root).or_default().push(id);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_is_monotonic_across_rounds() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut set = DisjointSet::new([a, b, c]);

        set.union(a, b);
        assert_eq!(set.find(a), set.find(b));

        // A later round that doesn't mention a/b again must not undo the merge.
        set.union(b, c);
        assert_eq!(set.find(a), set.find(c));
        assert_eq!(set.groups().len(), 1);
    }

    #[test]
    fn disjoint_pairs_remain_separate_groups() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut set = DisjointSet::new([a, b]);
        assert_eq!(set.groups().len(), 2);
    }
}
