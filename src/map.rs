//! Size-tracking containers built on [`TaggedHashArray`].
//!
//! [`TaggedHashMap`] owns a node heap and a table, hashes keys through
//! [`TaggedKey::hash_code`], and doubles the table once the entry count
//! passes `capacity * load_factor`.

use std::collections::VecDeque;
use std::fmt;
use std::mem;

use crate::config::Config;
use crate::error::Result;
use crate::heap::Heap;
use crate::table::{Bucket, NodeRef, SetOutcome, TableStats, TaggedHashArray};
use crate::value::TaggedKey;

/// Hash map over tagged keys.
pub struct TaggedHashMap<K, V> {
    heap: Heap<K, V>,
    table: TaggedHashArray,
    len: usize,
    config: Config,
}

impl<K: TaggedKey, V> TaggedHashMap<K, V> {
    pub fn new() -> Self {
        let config = Config::default();
        Self {
            heap: Heap::new(),
            table: TaggedHashArray::create_bounded(
                config.initial_capacity,
                config.maximum_capacity,
            ),
            len: 0,
            config,
        }
    }

    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            heap: Heap::new(),
            table: TaggedHashArray::create_bounded(
                config.initial_capacity,
                config.maximum_capacity,
            ),
            len: 0,
            config,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying table, for inspection.
    #[inline]
    pub fn table(&self) -> &TaggedHashArray {
        &self.table
    }

    /// The node heap backing [`table`](Self::table).
    #[inline]
    pub fn heap(&self) -> &Heap<K, V> {
        &self.heap
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.table.get(&self.heap, key.hash_code(), key)
    }

    pub fn has_key(&self, key: &K) -> bool {
        self.table
            .get_node(&self.heap, key.hash_code(), key)
            .is_some()
    }

    /// Inserts or updates `key`, returning the previous value.
    ///
    /// The hole sentinel is not a key; setting it is a no-op.
    pub fn set(&mut self, key: K, value: V) -> Option<V> {
        if key.is_hole() {
            return None;
        }
        let hash = key.hash_code();
        match self.table.set_val(&mut self.heap, hash, key, value) {
            SetOutcome::Replaced(old) => Some(old),
            SetOutcome::Inserted => {
                self.len += 1;
                if self.should_grow() {
                    let table = mem::take(&mut self.table);
                    self.table = table.resize(&mut self.heap);
                }
                None
            }
        }
    }

    /// Past the load threshold and still below the maximum capacity.
    #[inline]
    fn should_grow(&self) -> bool {
        self.table.capacity() < self.table.maximum_capacity()
            && self.len > self.config.threshold(self.table.capacity())
    }

    /// Overwrites the value of an existing key. Absent keys are not inserted.
    pub fn replace(&mut self, key: &K, value: V) -> bool {
        let Some(node) = self.table.get_node(&self.heap, key.hash_code(), key) else {
            return false;
        };
        match node {
            NodeRef::Linked(n) => self.heap[n].value = value,
            NodeRef::Tree(n) => self.heap[n].value = value,
        }
        true
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.table.remove_node(&mut self.heap, key.hash_code(), key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Drops every entry. The table keeps its current capacity.
    pub fn clear(&mut self) {
        self.table.clear();
        self.heap.clear();
        self.len = 0;
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            heap: &self.heap,
            buckets: self.table.buckets().iter(),
            pending: VecDeque::new(),
            remaining: self.len,
        }
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(self.iter())
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values(self.iter())
    }

    /// Calls `f` for every entry, in iteration order.
    pub fn for_each(&self, mut f: impl FnMut(&K, &V)) {
        for (k, v) in self.iter() {
            f(k, v);
        }
    }

    pub fn stats(&self) -> TableStats {
        self.table.stats(&self.heap)
    }
}

impl<K: TaggedKey, V: PartialEq> TaggedHashMap<K, V> {
    pub fn has_value(&self, value: &V) -> bool {
        self.values().any(|v| v == value)
    }
}

impl<K: TaggedKey + Clone, V: Clone> TaggedHashMap<K, V> {
    /// Copies every entry of `other` into `self`, overwriting shared keys.
    pub fn set_all(&mut self, other: &TaggedHashMap<K, V>) {
        for (k, v) in other.iter() {
            self.set(k.clone(), v.clone());
        }
    }
}

impl<K: TaggedKey, V> Default for TaggedHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TaggedKey + fmt::Debug, V: fmt::Debug> fmt::Debug for TaggedHashMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K: TaggedKey, V> IntoIterator for &'a TaggedHashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Iteration
// =============================================================================

/// Entries in bucket order. Chains are walked head to tail; trees are
/// walked breadth first, left before right.
pub struct Iter<'a, K, V> {
    heap: &'a Heap<K, V>,
    buckets: std::slice::Iter<'a, Bucket>,
    pending: VecDeque<NodeRef>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let heap = self.heap;
        loop {
            if let Some(node) = self.pending.pop_front() {
                self.remaining = self.remaining.saturating_sub(1);
                return Some(match node {
                    NodeRef::Linked(r) => {
                        let n = &heap[r];
                        if let Some(next) = n.next {
                            self.pending.push_front(NodeRef::Linked(next));
                        }
                        (&n.key, &n.value)
                    }
                    NodeRef::Tree(r) => {
                        let n = &heap[r];
                        self.pending.extend(n.left.map(NodeRef::Tree));
                        self.pending.extend(n.right.map(NodeRef::Tree));
                        (&n.key, &n.value)
                    }
                });
            }

            match *self.buckets.next()? {
                Bucket::Empty => {}
                Bucket::Chain(head) => self.pending.push_back(NodeRef::Linked(head)),
                Bucket::Tree(root) => self.pending.push_back(NodeRef::Tree(root)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

pub struct Keys<'a, K, V>(Iter<'a, K, V>);

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

impl<K, V> fmt::Debug for Keys<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Keys").field(&self.0).finish()
    }
}

pub struct Values<'a, K, V>(Iter<'a, K, V>);

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

impl<K, V> fmt::Debug for Values<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Values").field(&self.0).finish()
    }
}

// =============================================================================
// Set
// =============================================================================

/// Hash set over tagged keys.
pub struct TaggedHashSet<K> {
    map: TaggedHashMap<K, ()>,
}

impl<K: TaggedKey> TaggedHashSet<K> {
    pub fn new() -> Self {
        Self {
            map: TaggedHashMap::new(),
        }
    }

    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self {
            map: TaggedHashMap::with_config(config)?,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    /// Returns `true` if `key` was not already present. The hole sentinel is
    /// never added.
    pub fn add(&mut self, key: K) -> bool {
        !key.is_hole() && self.map.set(key, ()).is_none()
    }

    pub fn has(&self, key: &K) -> bool {
        self.map.has_key(key)
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> Keys<'_, K, ()> {
        self.map.keys()
    }

    pub fn stats(&self) -> TableStats {
        self.map.stats()
    }
}

impl<K: TaggedKey> Default for TaggedHashSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: TaggedKey + fmt::Debug> fmt::Debug for TaggedHashSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
