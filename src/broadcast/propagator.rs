use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::broadcaster::{BroadcastTask, Broadcaster};
use super::delivered::DeliveredSet;
use super::topology::{Neighbors, SharedTopology, Topology};
use crate::error::{ProtocolError, Result};
use crate::node::messages::{kinds, BroadcastRequest, ReadResponse, TopologyRequest};
use crate::node::{Body, Handler, MemberId, Message, MessageId, Node, Transport};

/// What a broadcast receipt led to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Propagation {
    /// Already seen; nothing was forwarded
    Duplicate,
    /// First sighting; this many forwarding tasks were queued
    Forwarded(usize),
}

/// Broadcast protocol for one node: deduplicate, acknowledge, and forward
/// along the tree.
pub struct Propagator {
    transport: Arc<dyn Transport>,
    delivered: DeliveredSet,
    topology: SharedTopology,
    broadcaster: Broadcaster,
    branching: usize,
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("delivered", &self.delivered.len())
            .field("branching", &self.branching)
            .field("broadcaster", &self.broadcaster)
            .finish()
    }
}

impl Propagator {
    pub fn new(transport: Arc<dyn Transport>, broadcaster: Broadcaster, branching: usize) -> Self {
        Self {
            transport,
            delivered: DeliveredSet::new(),
            topology: SharedTopology::new(),
            broadcaster,
            branching,
        }
    }

    /// Handle `topology`, `broadcast` and `read` on `node`
    pub fn register(self: &Arc<Self>, node: &Node) -> Result<()> {
        for kind in [kinds::TOPOLOGY, kinds::BROADCAST, kinds::READ] {
            node.register(kind, Arc::clone(self) as Arc<dyn Handler>)?;
        }
        Ok(())
    }

    pub fn delivered(&self) -> &DeliveredSet {
        &self.delivered
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn topology(&self) -> Result<Arc<Topology>> {
        self.topology.current()
    }

    /// This node's forwarding targets in the current tree
    pub fn neighbors(&self) -> Result<Neighbors> {
        let local = self.transport.local_id()?;
        Ok(self.topology.current()?.neighbors(&local))
    }

    /// Derive a fresh tree from the transport's membership and publish it
    pub fn rebuild_topology(&self) -> Result<Arc<Topology>> {
        let members = self.transport.members()?;
        let topology = self.topology.rebuild(&members, self.branching)?;
        let local = self.transport.local_id()?;
        let neighbors = topology.neighbors(&local);
        info!(
            "[{}] Built broadcast tree over {} members (depth {}), neighbours: {:?}",
            local,
            topology.len(),
            topology.depth(),
            neighbors.iter().collect::<Vec<_>>()
        );
        Ok(topology)
    }

    /// Every value seen so far, unordered
    pub fn read(&self) -> Vec<MessageId> {
        self.delivered.snapshot()
    }

    /// Record `id` and, on first sighting, queue `body` for every neighbour
    /// other than `sender` and this node.
    pub async fn propagate(
        &self,
        sender: &MemberId,
        id: MessageId,
        body: &Body,
    ) -> Result<Propagation> {
        let local = self.transport.local_id()?;
        let topology = self.topology.current()?;

        if !self.delivered.observe(id) {
            debug!("[{}] Already seen {} (from {})", local, id, sender);
            return Ok(Propagation::Duplicate);
        }

        let forward = body.stripped();
        let mut forwarded = 0;
        for neighbor in topology.neighbors(&local).iter() {
            if neighbor == sender || *neighbor == local {
                continue;
            }
            let task = BroadcastTask {
                dest: neighbor.clone(),
                body: forward.clone(),
            };
            // The sender is already acknowledged, so a stopped engine only ends forwarding
            if let Err(e) = self.broadcaster.submit(task).await {
                warn!("[{}] Not forwarding {} to {}: {}", local, id, neighbor, e);
                break;
            }
            forwarded += 1;
        }

        debug!(
            "[{}] Stored {} from {}, forwarding to {} neighbour(s)",
            local, id, sender, forwarded
        );
        Ok(Propagation::Forwarded(forwarded))
    }

    pub async fn handle_broadcast(&self, msg: Message) -> Result<Propagation> {
        let request: BroadcastRequest = msg.body.decode()?;

        // The sender is acknowledged regardless of what forwarding does
        let transport = Arc::clone(&self.transport);
        let ack_to = msg.clone();
        tokio::spawn(async move {
            if let Err(e) = transport.reply(&ack_to, Body::new(kinds::BROADCAST_OK)).await {
                warn!("Failed to acknowledge broadcast from {}: {}", ack_to.src, e);
            }
        });

        self.propagate(&msg.src, request.message, &msg.body).await
    }

    pub async fn handle_topology(&self, msg: &Message) -> Result<()> {
        match msg.body.decode::<TopologyRequest>() {
            Ok(announced) => debug!(
                "Ignoring announced neighbour map for {} members in favour of the derived tree",
                announced.topology.len()
            ),
            Err(e) => debug!("Ignoring unreadable neighbour map: {}", e),
        }
        self.rebuild_topology()?;
        self.transport
            .reply(msg, Body::new(kinds::TOPOLOGY_OK))
            .await
    }

    pub async fn handle_read(&self, msg: &Message) -> Result<()> {
        let body = Body::with_payload(
            kinds::READ_OK,
            &ReadResponse {
                messages: self.read(),
            },
        )?;
        self.transport.reply(msg, body).await
    }

    /// Stop the delivery workers and wait for them to exit
    pub async fn shutdown(&self) -> Result<()> {
        self.broadcaster.shutdown();
        self.broadcaster.join().await
    }
}

#[async_trait]
impl Handler for Propagator {
    async fn handle(&self, msg: Message) -> Result<()> {
        match msg.body.kind.as_str() {
            kinds::BROADCAST => self.handle_broadcast(msg).await.map(|_| ()),
            kinds::TOPOLOGY => self.handle_topology(&msg).await,
            kinds::READ => self.handle_read(&msg).await,
            other => Err(ProtocolError::NotSupported(other.to_string()).into()),
        }
    }
}
