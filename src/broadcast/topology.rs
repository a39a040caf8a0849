//! Broadcast tree
//!
//! Members are laid out in announcement order as an implicit k-ary tree:
//! index `i` has parent `(i - 1) / k` and children `k*i + 1 ..= k*i + k`.
//! A broadcast that follows tree edges reaches all `N` members in
//! `O(log_k N)` hops while each member talks to at most `k + 1` others.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::concurrency_error;
use crate::error::Result;
use crate::node::MemberId;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    members: Vec<MemberId>,
    positions: HashMap<MemberId, usize>,
    branching: usize,
}

/// Forwarding targets of one member
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub parent: Option<MemberId>,
    pub children: Vec<MemberId>,
}

impl Neighbors {
    pub fn iter(&self) -> impl Iterator<Item = &MemberId> {
        self.parent.iter().chain(self.children.iter())
    }

    pub fn len(&self) -> usize {
        self.children.len() + usize::from(self.parent.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Topology {
    /// Lay out `members` as a tree with up to `branching` children per node.
    /// Repeated ids keep their first position.
    pub fn build(members: &[MemberId], branching: usize) -> Self {
        let branching = branching.max(1);
        let mut ordered = Vec::with_capacity(members.len());
        let mut positions = HashMap::with_capacity(members.len());
        for member in members {
            if !positions.contains_key(member) {
                positions.insert(member.clone(), ordered.len());
                ordered.push(member.clone());
            }
        }
        Self {
            members: ordered,
            positions,
            branching,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn branching(&self) -> usize {
        self.branching
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn root(&self) -> Option<&MemberId> {
        self.members.first()
    }

    pub fn position(&self, member: &MemberId) -> Option<usize> {
        self.positions.get(member).copied()
    }

    pub fn parent_of(&self, index: usize) -> Option<&MemberId> {
        if index == 0 || index >= self.members.len() {
            return None;
        }
        self.members.get((index - 1) / self.branching)
    }

    pub fn children_of(&self, index: usize) -> &[MemberId] {
        let first = index
            .saturating_mul(self.branching)
            .saturating_add(1)
            .min(self.members.len());
        let end = first
            .saturating_add(self.branching)
            .min(self.members.len());
        &self.members[first..end]
    }

    /// Parent and children of `member`; empty if it is not part of the tree
    pub fn neighbors(&self, member: &MemberId) -> Neighbors {
        match self.position(member) {
            Some(index) => Neighbors {
                parent: self.parent_of(index).cloned(),
                children: self.children_of(index).to_vec(),
            },
            None => Neighbors::default(),
        }
    }

    /// Number of edges on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut index = self.members.len().saturating_sub(1);
        while index > 0 {
            index = (index - 1) / self.branching;
            depth += 1;
        }
        depth
    }
}

/// The current tree, replaced wholesale on every rebuild
#[derive(Debug, Default)]
pub struct SharedTopology {
    current: RwLock<Arc<Topology>>,
}

impl SharedTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the tree as last published
    pub fn current(&self) -> Result<Arc<Topology>> {
        self.current
            .read()
            .map(|topology| Arc::clone(&*topology))
            .map_err(|e| concurrency_error!("topology lock poisoned: {}", e))
    }

    /// Swap in a fully built tree
    pub fn publish(&self, topology: Topology) -> Result<Arc<Topology>> {
        let topology = Arc::new(topology);
        let mut current = self
            .current
            .write()
            .map_err(|e| concurrency_error!("topology lock poisoned: {}", e))?;
        *current = Arc::clone(&topology);
        debug!(
            "Published topology with {} members, depth {}",
            topology.len(),
            topology.depth()
        );
        Ok(topology)
    }

    /// Build from `members` off to the side, then publish
    pub fn rebuild(&self, members: &[MemberId], branching: usize) -> Result<Arc<Topology>> {
        self.publish(Topology::build(members, branching))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<MemberId> {
        names.iter().map(|n| MemberId::from(*n)).collect()
    }

    fn cluster(n: usize) -> Vec<MemberId> {
        (0..n).map(|i| MemberId::from(format!("n{}", i))).collect()
    }

    #[test]
    fn test_five_node_binary_tree() {
        let topology = Topology::build(&cluster(5), 2);
        assert_eq!(topology.root(), Some(&MemberId::from("n0")));

        let root = topology.neighbors(&"n0".into());
        assert_eq!(root.parent, None);
        assert_eq!(root.children, ids(&["n1", "n2"]));

        let n1 = topology.neighbors(&"n1".into());
        assert_eq!(n1.parent, Some("n0".into()));
        assert_eq!(n1.children, ids(&["n3", "n4"]));

        let n4 = topology.neighbors(&"n4".into());
        assert_eq!(n4.parent, Some("n1".into()));
        assert!(n4.children.is_empty());
        assert_eq!(topology.depth(), 2);
    }

    #[test]
    fn test_fanout_bounded_by_branching() {
        let topology = Topology::build(&cluster(25), 4);
        for member in topology.members() {
            assert!(topology.neighbors(member).len() <= 5);
        }
        assert_eq!(topology.neighbors(&"n0".into()).len(), 4);
        assert_eq!(topology.neighbors(&"n1".into()).len(), 5);
    }

    #[test]
    fn test_degenerate_topologies() {
        let empty = Topology::build(&[], 4);
        assert!(empty.is_empty());
        assert!(empty.neighbors(&"n0".into()).is_empty());
        assert_eq!(empty.depth(), 0);

        let single = Topology::build(&cluster(1), 4);
        assert!(single.neighbors(&"n0".into()).is_empty());

        let topology = Topology::build(&cluster(3), 2);
        assert!(topology.neighbors(&"n9".into()).is_empty());
    }

    #[test]
    fn test_duplicates_keep_first_position() {
        let topology = Topology::build(&ids(&["n0", "n1", "n0", "n2"]), 2);
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.position(&"n2".into()), Some(2));
    }

    #[test]
    fn test_zero_branching_is_a_chain() {
        let topology = Topology::build(&cluster(3), 0);
        assert_eq!(topology.branching(), 1);
        let n1 = topology.neighbors(&"n1".into());
        assert_eq!(n1.parent, Some("n0".into()));
        assert_eq!(n1.children, ids(&["n2"]));
    }

    #[test]
    fn test_rebuild_replaces_wholesale() {
        let shared = SharedTopology::new();
        assert!(shared.current().unwrap().is_empty());

        let before = shared.rebuild(&cluster(3), 2).unwrap();
        let after = shared.rebuild(&ids(&["a", "b"]), 2).unwrap();
        assert_eq!(before.len(), 3);
        assert_eq!(shared.current().unwrap(), after);
        assert!(shared.current().unwrap().position(&"n0".into()).is_none());
    }

    #[test]
    fn test_readers_never_see_partial_rebuild() {
        let shared = Arc::new(SharedTopology::new());
        let left: Vec<MemberId> = (0..40).map(|i| MemberId::from(format!("a{}", i))).collect();
        let right: Vec<MemberId> = (0..60).map(|i| MemberId::from(format!("b{}", i))).collect();
        shared.rebuild(&left, 3).unwrap();

        std::thread::scope(|s| {
            let writer = Arc::clone(&shared);
            let (l, r) = (left.clone(), right.clone());
            s.spawn(move || {
                for round in 0..200 {
                    let members = if round % 2 == 0 { &r } else { &l };
                    writer.rebuild(members, 3).unwrap();
                }
            });

            for _ in 0..4 {
                let reader = Arc::clone(&shared);
                s.spawn(move || {
                    for _ in 0..500 {
                        let topology = reader.current().unwrap();
                        let prefix = &topology.members()[0].as_str()[..1];
                        let expected_len = if prefix == "a" { 40 } else { 60 };
                        assert_eq!(topology.len(), expected_len);
                        assert!(topology
                            .members()
                            .iter()
                            .all(|m| m.as_str().starts_with(prefix)));
                    }
                });
            }
        });
    }
}
