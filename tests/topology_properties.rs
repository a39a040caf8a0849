use std::collections::{HashSet, VecDeque};

use proptest::prelude::*;
use treecast::broadcast::Topology;
use treecast::node::MemberId;

fn cluster(n: usize) -> Vec<MemberId> {
    (0..n).map(|i| MemberId::from(format!("n{}", i))).collect()
}

proptest! {
    #[test]
    fn test_tree_spans_every_member(size in 1usize..300, branching in 1usize..9) {
        let members = cluster(size);
        let topology = Topology::build(&members, branching);

        let mut seen = HashSet::new();
        let mut frontier = VecDeque::new();
        frontier.push_back(topology.root().unwrap().clone());
        while let Some(member) = frontier.pop_front() {
            prop_assert!(seen.insert(member.clone()), "{} reached twice", member);
            for child in topology.neighbors(&member).children {
                frontier.push_back(child);
            }
        }
        prop_assert_eq!(seen.len(), size);
    }

    #[test]
    fn test_parent_and_child_edges_agree(size in 1usize..300, branching in 1usize..9) {
        let topology = Topology::build(&cluster(size), branching);

        for member in topology.members() {
            let neighbors = topology.neighbors(member);
            prop_assert!(neighbors.len() <= branching + 1);
            prop_assert!(neighbors.iter().all(|n| n != member));
            match &neighbors.parent {
                Some(parent) => {
                    prop_assert!(topology.neighbors(parent).children.contains(member));
                }
                None => prop_assert_eq!(Some(member), topology.root()),
            }
            for child in &neighbors.children {
                let child_neighbors = topology.neighbors(child);
                prop_assert_eq!(child_neighbors.parent.as_ref(), Some(member));
            }
        }
    }

    #[test]
    fn test_depth_is_logarithmic(size in 2usize..5000, branching in 2usize..9) {
        let topology = Topology::build(&cluster(size), branching);
        let bound = (size as f64).log(branching as f64).ceil() as usize;
        prop_assert!(topology.depth() <= bound, "depth {} > {}", topology.depth(), bound);
    }
}
