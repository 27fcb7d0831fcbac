//! Bounded "seen id" set with oldest-first eviction.

use std::collections::{HashSet, VecDeque};

use afterhours_types::MessageId;

/// Default capacity for cross-context duplicate suppression.
pub const DEFAULT_CAPACITY: usize = 1000;

/// A fixed-capacity set of message ids.
///
/// Inserting into a full set evicts the oldest id. Membership checks are
/// O(1).
#[derive(Debug, Clone)]
pub struct SeenIds {
    capacity: usize,
    order: VecDeque<MessageId>,
    members: HashSet<MessageId>,
}

impl SeenIds {
    /// An empty set holding at most `capacity` ids (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// Whether `id` is currently remembered.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.members.contains(id)
    }

    /// Remember `id`. Returns `false` if it was already present.
    pub fn insert(&mut self, id: MessageId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SeenIds {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}
