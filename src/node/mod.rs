//! Host RPC layer
//!
//! A minimal Maelstrom node: identity and membership from `init`, typed
//! message envelopes, request/reply correlation, and dispatch of inbound
//! messages to handlers keyed by message type.
use async_trait::async_trait;

pub mod member_id;
pub mod messages;
pub mod runtime;

use crate::error::Result;
pub use member_id::MemberId;
pub use messages::{Body, Message, MessageId};
pub use runtime::{Node, RuntimeStats};

/// Point-to-point messaging with cluster membership
#[async_trait]
pub trait Transport: Send + Sync {
    /// This node's identifier
    fn local_id(&self) -> Result<MemberId>;

    /// All cluster members, in the order announced by the harness
    fn members(&self) -> Result<Vec<MemberId>>;

    /// Deliver `body` to `dest`; `Ok` once the peer has acknowledged it
    async fn send(&self, dest: &MemberId, body: Body) -> Result<()>;

    /// Answer `request` with `body`
    async fn reply(&self, request: &Message, body: Body) -> Result<()>;
}

/// Handles inbound messages of one or more types
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, msg: Message) -> Result<()>;
}
