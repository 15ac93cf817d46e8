//! Bounded, insertion-ordered record of feed items already seen.
//!
//! One cache belongs to one poller and is only touched from that poller's
//! task, so there is no locking here.

use std::collections::{HashMap, VecDeque};

use crate::types::FeedItem;

#[derive(Debug, Clone)]
pub struct DedupCache {
    items: HashMap<String, FeedItem>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DedupCache {
    /// A zero capacity is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Record `item` as seen, evicting the oldest entries past capacity.
    ///
    /// Saving an identity that is already tracked does nothing: the entry
    /// keeps its original position and stored value.
    pub fn save(&mut self, item: FeedItem) {
        if self.items.contains_key(item.identity()) {
            return;
        }

        let identity = item.identity().to_string();
        self.order.push_back(identity.clone());
        self.items.insert(identity, item);

        self.trim();
    }

    /// Mark a tracked identity as the newest entry so it is evicted last.
    /// Returns `false` (and changes nothing) for an untracked identity.
    pub fn touch(&mut self, identity: &str) -> bool {
        if !self.items.contains_key(identity) {
            return false;
        }

        if let Some(pos) = self.order.iter().position(|tracked| tracked == identity) {
            if let Some(entry) = self.order.remove(pos) {
                self.order.push_back(entry);
            }
        }
        true
    }

    pub fn exists(&self, identity: &str) -> bool {
        self.items.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tracked identities, oldest first.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    fn trim(&mut self) {
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.items.remove(&evicted);
            }
        }
    }
}
