//! Arena-backed LRU store with per-entry expiry.
//!
//! Nodes live in a `Vec` and link to each other by index, so moving an entry to the front or
//! unlinking the tail is a constant-time index update. A key -> index map gives O(1) lookup.
//! Freed slots are recycled through a free list.
//!
//! The store is not synchronized; [`ResponseCache`](super::ResponseCache) wraps it in a mutex so
//! the map and the recency list are always mutated together.

use std::{borrow::Borrow, collections::HashMap, hash::Hash};
use tokio::time::Instant;

struct Node<K, V> {
    key: K,
    value: V,
    expires_at: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Result of an insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New key stored.
    Inserted,
    /// Existing key overwritten (value, expiry and recency reset).
    Replaced,
    /// New key stored after evicting the least-recently-used entry.
    Evicted,
    /// Capacity is zero; nothing was stored.
    Rejected,
}

pub struct LruStore<K, V> {
    map: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    /// Most recently used.
    head: Option<usize>,
    /// Least recently used.
    tail: Option<usize>,
    capacity: usize,
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq + Clone,
{
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            capacity,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the live value for `key`, promoting it to most recently used.
    ///
    /// An entry whose expiry is at or before `now` is removed and reported as absent.
    pub fn get<Q>(&mut self, key: &Q, now: Instant) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let idx = *self.map.get(key)?;

        if self.node(idx).expires_at <= now {
            self.remove_index(idx);
            return None;
        }

        self.move_to_front(idx);
        Some(&self.node(idx).value)
    }

    /// Inserts or fully overwrites `key`.
    pub fn insert(&mut self, key: K, value: V, expires_at: Instant) -> InsertOutcome {
        if self.capacity == 0 {
            return InsertOutcome::Rejected;
        }

        if let Some(&idx) = self.map.get(&key) {
            let node = self.node_mut(idx);
            node.value = value;
            node.expires_at = expires_at;
            self.move_to_front(idx);
            return InsertOutcome::Replaced;
        }

        let mut outcome = InsertOutcome::Inserted;
        if self.map.len() >= self.capacity {
            if let Some(tail) = self.tail {
                self.remove_index(tail);
                outcome = InsertOutcome::Evicted;
            }
        }

        let node = Node { key: key.clone(), value, expires_at, prev: None, next: None };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        self.map.insert(key, idx);
        self.push_front(idx);
        outcome
    }

    /// Removes `key`, returning `true` if an entry (expired or not) was stored.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.map.get(key) {
            Some(&idx) => {
                self.remove_index(idx);
                true
            }
            None => false,
        }
    }

    /// Drops every entry by replacing the backing structures.
    pub fn clear(&mut self) {
        self.map = HashMap::new();
        self.slots = Vec::new();
        self.free = Vec::new();
        self.head = None;
        self.tail = None;
    }

    /// Removes all entries expired at `now`. Returns the number removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let mut expired = Vec::new();
        let mut cursor = self.tail;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            if node.expires_at <= now {
                expired.push(idx);
            }
            cursor = node.prev;
        }

        for idx in &expired {
            self.remove_index(*idx);
        }
        expired.len()
    }

    /// Keys ordered from most to least recently used.
    #[must_use]
    pub fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.node(idx);
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    fn node(&self, idx: usize) -> &Node<K, V> {
        match self.slots[idx].as_ref() {
            Some(node) => node,
            None => unreachable!("linked index {idx} points at a free slot"),
        }
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        match self.slots[idx].as_mut() {
            Some(node) => node,
            None => unreachable!("linked index {idx} points at a free slot"),
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.node_mut(h).prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn remove_index(&mut self, idx: usize) {
        self.unlink(idx);
        if let Some(node) = self.slots[idx].take() {
            self.map.remove(&node.key);
        }
        self.free.push(idx);
    }
}
