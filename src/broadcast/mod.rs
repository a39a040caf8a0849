//! Tree-structured broadcast
//!
//! Each node keeps the set of values it has seen, derives a spanning tree
//! from the cluster membership, and forwards every newly seen value to its
//! parent and children through a pool of retrying delivery workers. Values
//! therefore reach every member as long as the transport eventually delivers,
//! while each node only ever talks to a bounded number of peers.
pub mod broadcaster;
pub mod delivered;
pub mod propagator;
pub mod topology;

#[cfg(test)]
pub(crate) mod test_support;

pub use broadcaster::{BroadcastTask, Broadcaster, BroadcasterStats};
pub use delivered::DeliveredSet;
pub use propagator::{Propagation, Propagator};
pub use topology::{Neighbors, SharedTopology, Topology};
