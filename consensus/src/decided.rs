//! Recently-decided cache — terminal statuses of ids that left the registry.
//!
//! A bounded FIFO map: when full, the oldest decision is evicted. The engine
//! consults it when a newcomer references an id that is no longer processing.

use snowstorm_types::{Status, TxId};
use std::collections::{HashMap, VecDeque};

pub struct DecidedCache {
    statuses: HashMap<TxId, Status>,
    order: VecDeque<TxId>,
    capacity: usize,
}

impl DecidedCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            statuses: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a terminal status. Non-terminal statuses and ids already
    /// present are ignored, so a recorded decision is never overwritten.
    pub fn insert(&mut self, id: TxId, status: Status) {
        if self.capacity == 0 || !status.is_decided() || self.statuses.contains_key(&id) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.statuses.remove(&evicted);
            }
        }
        self.statuses.insert(id, status);
        self.order.push_back(id);
    }

    pub fn get(&self, id: &TxId) -> Option<Status> {
        self.statuses.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> TxId {
        TxId::new([byte; 32])
    }

    #[test]
    fn records_terminal_statuses_only() {
        let mut cache = DecidedCache::new(4);
        cache.insert(id(1), Status::Accepted);
        cache.insert(id(2), Status::Processing);
        assert_eq!(cache.get(&id(1)), Some(Status::Accepted));
        assert_eq!(cache.get(&id(2)), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn first_decision_sticks() {
        let mut cache = DecidedCache::new(4);
        cache.insert(id(1), Status::Rejected);
        cache.insert(id(1), Status::Accepted);
        assert_eq!(cache.get(&id(1)), Some(Status::Rejected));
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut cache = DecidedCache::new(2);
        cache.insert(id(1), Status::Accepted);
        cache.insert(id(2), Status::Rejected);
        cache.insert(id(3), Status::Accepted);
        assert_eq!(cache.get(&id(1)), None);
        assert_eq!(cache.get(&id(2)), Some(Status::Rejected));
        assert_eq!(cache.get(&id(3)), Some(Status::Accepted));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let mut cache = DecidedCache::new(0);
        cache.insert(id(1), Status::Accepted);
        assert!(cache.is_empty());
    }
}
