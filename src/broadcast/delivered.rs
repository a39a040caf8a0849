use dashmap::DashSet;

use crate::node::MessageId;

/// Every broadcast value this node has seen. Grows for the life of the process.
#[derive(Debug, Default)]
pub struct DeliveredSet {
    ids: DashSet<MessageId>,
}

impl DeliveredSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`, returning true only for the first observation.
    ///
    /// The check and the insert happen under the same shard lock, so exactly
    /// one of any number of concurrent callers for the same id gets `true`.
    pub fn observe(&self, id: MessageId) -> bool {
        self.ids.insert(id)
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All observed ids, in no particular order
    pub fn snapshot(&self) -> Vec<MessageId> {
        self.ids.iter().map(|id| *id).collect()
    }
}
