//! The tagged hash array: a power-of-two slot array whose buckets are empty,
//! a chain, or a red-black tree.

use std::mem;

use tracing::{debug, trace, warn};

use crate::heap::{Heap, LinkedRef, TreeRef};
use crate::linked::LinkedNode;
use crate::rbtree::RbTreeNode;
use crate::value::TaggedKey;

/// Chain length at which a bucket is converted into a tree.
pub const TREEIFY_THRESHOLD: usize = 8;

/// Largest slot count `resize` will produce.
pub const MAXIMUM_CAPACITY: usize = 1 << 30;

/// Contents of one slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Bucket {
    #[default]
    Empty,
    Chain(LinkedRef),
    Tree(TreeRef),
}

/// A located entry, in whichever representation its bucket uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRef {
    Linked(LinkedRef),
    Tree(TreeRef),
}

/// Result of [`TaggedHashArray::set_val`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome<V> {
    /// The key was absent; a new entry was created.
    Inserted,
    /// The key was present; its previous value is returned.
    Replaced(V),
}

impl<V> SetOutcome<V> {
    #[inline]
    pub fn is_inserted(&self) -> bool {
        matches!(self, SetOutcome::Inserted)
    }
}

/// Bucket occupancy snapshot, used for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub capacity: usize,
    pub entries: usize,
    pub empty_buckets: usize,
    pub chain_buckets: usize,
    pub tree_buckets: usize,
    pub longest_chain: usize,
    pub deepest_tree: usize,
}

/// Hash table core.
///
/// The table owns only its slot array. Nodes live in a [`Heap`] passed to
/// every operation, and the caller supplies each key's hash. Capacity is
/// always a power of two and the bucket for `hash` is `(capacity - 1) & hash`.
#[derive(Debug)]
pub struct TaggedHashArray {
    slots: Box<[Bucket]>,
    maximum_capacity: usize,
}

impl Default for TaggedHashArray {
    fn default() -> Self {
        Self::create(1)
    }
}

impl TaggedHashArray {
    /// Allocates `capacity` empty slots.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero or not a power of two.
    pub fn create(capacity: usize) -> Self {
        Self::create_bounded(capacity, MAXIMUM_CAPACITY)
    }

    /// Like [`create`](Self::create), but [`resize`](Self::resize) stops at
    /// `maximum_capacity` instead of [`MAXIMUM_CAPACITY`].
    pub fn create_bounded(capacity: usize, maximum_capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "capacity must be a non-zero power of two, got {capacity}"
        );
        assert!(
            capacity <= maximum_capacity,
            "capacity {capacity} exceeds maximum {maximum_capacity}"
        );
        Self {
            slots: vec![Bucket::Empty; capacity].into_boxed_slice(),
            maximum_capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn maximum_capacity(&self) -> usize {
        self.maximum_capacity
    }

    #[inline]
    pub fn index_for(&self, hash: i32) -> usize {
        (self.capacity() - 1) & (hash as u32 as usize)
    }

    #[inline]
    pub fn bucket(&self, index: usize) -> Bucket {
        self.slots[index]
    }

    #[inline]
    pub fn buckets(&self) -> &[Bucket] {
        &self.slots
    }

    /// Empties every slot in place. Nodes are left to the heap's owner.
    pub fn clear(&mut self) {
        self.slots.fill(Bucket::Empty);
    }

    pub fn get_node<K: TaggedKey, V>(
        &self,
        heap: &Heap<K, V>,
        hash: i32,
        key: &K,
    ) -> Option<NodeRef> {
        if key.is_hole() {
            return None;
        }
        match self.slots[self.index_for(hash)] {
            Bucket::Empty => None,
            Bucket::Tree(root) => RbTreeNode::find(heap, root, hash, key).map(NodeRef::Tree),
            Bucket::Chain(head) => LinkedNode::find(heap, head, hash, key).map(NodeRef::Linked),
        }
    }

    pub fn get<'h, K: TaggedKey, V>(
        &self,
        heap: &'h Heap<K, V>,
        hash: i32,
        key: &K,
    ) -> Option<&'h V> {
        self.get_node(heap, hash, key).map(|node| match node {
            NodeRef::Linked(n) => &heap[n].value,
            NodeRef::Tree(n) => &heap[n].value,
        })
    }

    pub fn set_val<K: TaggedKey, V>(
        &mut self,
        heap: &mut Heap<K, V>,
        hash: i32,
        key: K,
        value: V,
    ) -> SetOutcome<V> {
        let index = self.index_for(hash);
        match self.slots[index] {
            Bucket::Empty => {
                let node = heap.new_linked_node(hash, key, value, None);
                self.slots[index] = Bucket::Chain(node);
                SetOutcome::Inserted
            }
            Bucket::Chain(head) => {
                let mut visited = 0;
                let mut tail = head;
                loop {
                    visited += 1;
                    let node = &mut heap[tail];
                    if node.matches(hash, &key) {
                        return SetOutcome::Replaced(mem::replace(&mut node.value, value));
                    }
                    match node.next {
                        Some(next) => tail = next,
                        None => break,
                    }
                }

                let node = heap.new_linked_node(hash, key, value, None);
                heap[tail].next = Some(node);
                if visited + 1 >= TREEIFY_THRESHOLD {
                    self.treeing_bin(heap, hash);
                }
                SetOutcome::Inserted
            }
            Bucket::Tree(root) => {
                let before = heap[root].count;
                let (root, replaced) = RbTreeNode::set(heap, Some(root), hash, key, value);
                heap[root].red = false;
                self.slots[index] = Bucket::Tree(root);
                match replaced {
                    Some(old) => {
                        debug_assert_eq!(heap[root].count, before);
                        SetOutcome::Replaced(old)
                    }
                    None => {
                        debug_assert_eq!(heap[root].count, before + 1);
                        SetOutcome::Inserted
                    }
                }
            }
        }
    }

    pub fn remove_node<K: TaggedKey, V>(
        &mut self,
        heap: &mut Heap<K, V>,
        hash: i32,
        key: &K,
    ) -> Option<V> {
        if key.is_hole() {
            return None;
        }
        let index = self.index_for(hash);
        match self.slots[index] {
            Bucket::Empty => None,
            Bucket::Chain(head) => {
                let mut prev: Option<LinkedRef> = None;
                let mut current = Some(head);
                while let Some(node) = current {
                    let n = &heap[node];
                    let next = n.next;
                    if n.matches(hash, key) {
                        match prev {
                            None => self.slots[index] = next.map_or(Bucket::Empty, Bucket::Chain),
                            Some(p) => heap[p].next = next,
                        }
                        return heap.reclaim_linked(node).map(|n| n.value);
                    }
                    prev = Some(node);
                    current = next;
                }
                None
            }
            Bucket::Tree(root) => {
                let (root, removed) = RbTreeNode::remove(heap, root, hash, key);
                self.slots[index] = match root {
                    None => Bucket::Empty,
                    Some(r) => {
                        heap[r].red = false;
                        Bucket::Tree(r)
                    }
                };
                removed
            }
        }
    }

    /// Doubles the slot array and redistributes every bucket.
    ///
    /// At [`maximum_capacity`](Self::maximum_capacity) the table is returned
    /// unchanged. Each old bucket `j` splits into `j` and `j + old_capacity`
    /// on bit `old_capacity` of the hash.
    pub fn resize<K: TaggedKey, V>(self, heap: &mut Heap<K, V>) -> Self {
        let old_capacity = self.capacity();
        if old_capacity >= self.maximum_capacity {
            warn!(
                capacity = old_capacity,
                "tagged hash array already at maximum capacity"
            );
            return self;
        }

        let new_capacity = old_capacity << 1;
        let mut table = Self::create_bounded(new_capacity, self.maximum_capacity);
        for (index, bucket) in self.slots.iter().enumerate() {
            match *bucket {
                Bucket::Empty => {}
                Bucket::Tree(root) => {
                    let (lo, hi) = RbTreeNode::divide(heap, root, old_capacity);
                    if let Some(lo) = lo {
                        table.slots[index] = Bucket::Tree(lo);
                    }
                    if let Some(hi) = hi {
                        table.slots[index + old_capacity] = Bucket::Tree(hi);
                    }
                }
                Bucket::Chain(head) => {
                    let n = &heap[head];
                    if n.next.is_none() {
                        let target = table.index_for(n.hash);
                        table.slots[target] = Bucket::Chain(head);
                    } else {
                        table.node_disperse(heap, head, index, old_capacity);
                    }
                }
            }
        }

        debug!(old_capacity, new_capacity, "resized tagged hash array");
        table
    }

    /// Installs the low and high halves of the chain at `head` at `index`
    /// and `index + old_capacity`.
    pub fn node_disperse<K, V>(
        &mut self,
        heap: &mut Heap<K, V>,
        head: LinkedRef,
        index: usize,
        old_capacity: usize,
    ) {
        let (lo, hi) = LinkedNode::disperse(heap, head, old_capacity);
        if let Some(lo) = lo {
            self.slots[index] = Bucket::Chain(lo);
        }
        if let Some(hi) = hi {
            self.slots[index + old_capacity] = Bucket::Chain(hi);
        }
        trace!(index, split = lo.is_some() && hi.is_some(), "dispersed chain");
    }

    /// Converts the chain bucket for `hash` into a tree. Other buckets are
    /// left alone.
    pub fn treeing_bin<K: TaggedKey, V>(&mut self, heap: &mut Heap<K, V>, hash: i32) {
        let index = self.index_for(hash);
        let Bucket::Chain(head) = self.slots[index] else {
            return;
        };
        if let Some(root) = RbTreeNode::treeify(heap, head) {
            self.slots[index] = Bucket::Tree(root);
            debug!(index, entries = heap[root].count, "treeified bucket");
        }
    }

    pub fn stats<K, V>(&self, heap: &Heap<K, V>) -> TableStats {
        let mut stats = TableStats {
            capacity: self.capacity(),
            ..TableStats::default()
        };
        for bucket in self.slots.iter() {
            match *bucket {
                Bucket::Empty => stats.empty_buckets += 1,
                Bucket::Chain(head) => {
                    let len = LinkedNode::len(heap, head);
                    stats.chain_buckets += 1;
                    stats.entries += len;
                    stats.longest_chain = stats.longest_chain.max(len);
                }
                Bucket::Tree(root) => {
                    stats.tree_buckets += 1;
                    stats.entries += heap[root].count as usize;
                    stats.deepest_tree = stats.deepest_tree.max(RbTreeNode::height(heap, root));
                }
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbtree::validate_tree;
    use crate::value::TaggedValue;

    type TestHeap = Heap<TaggedValue, i32>;

    fn key(i: i32) -> TaggedValue {
        TaggedValue::Int(i)
    }

    fn chain_hashes(table: &TaggedHashArray, heap: &TestHeap, index: usize) -> Vec<i32> {
        let Bucket::Chain(head) = table.bucket(index) else {
            panic!("bucket {index} is not a chain: {:?}", table.bucket(index));
        };
        let mut out = Vec::new();
        let mut current = Some(head);
        while let Some(node) = current {
            out.push(heap[node].hash());
            current = heap[node].next();
        }
        out
    }

    #[test]
    #[should_panic(expected = "non-zero power of two")]
    fn test_zero_capacity_panics() {
        let _ = TaggedHashArray::create(0);
    }

    #[test]
    #[should_panic(expected = "non-zero power of two")]
    fn test_odd_capacity_panics() {
        let _ = TaggedHashArray::create(12);
    }

    #[test]
    fn test_set_get_update() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(16);
        assert_eq!(table.set_val(&mut heap, 3, key(3), 30), SetOutcome::Inserted);
        assert_eq!(table.set_val(&mut heap, 19, key(19), 190), SetOutcome::Inserted);
        assert_eq!(table.get(&heap, 3, &key(3)), Some(&30));
        assert_eq!(table.get(&heap, 19, &key(19)), Some(&190));
        assert_eq!(table.get(&heap, 35, &key(35)), None);

        assert_eq!(table.set_val(&mut heap, 3, key(3), 31), SetOutcome::Replaced(30));
        assert_eq!(table.get(&heap, 3, &key(3)), Some(&31));
        assert_eq!(table.stats(&heap).entries, 2);
        assert_eq!(chain_hashes(&table, &heap, 3), [3, 19]);
    }

    #[test]
    fn test_treeify_at_threshold() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        for i in 0..TREEIFY_THRESHOLD as i32 {
            assert!(table.set_val(&mut heap, i * 8, key(i), i).is_inserted());
            let shaped_as_tree = matches!(table.bucket(0), Bucket::Tree(_));
            assert_eq!(
                shaped_as_tree,
                i + 1 == TREEIFY_THRESHOLD as i32,
                "after {} inserts",
                i + 1
            );
        }

        let Bucket::Tree(root) = table.bucket(0) else {
            unreachable!()
        };
        assert_eq!(validate_tree(&heap, root), TREEIFY_THRESHOLD);
        for i in 0..TREEIFY_THRESHOLD as i32 {
            assert_eq!(table.get(&heap, i * 8, &key(i)), Some(&i));
        }
        // Chain nodes were handed back when the bucket was converted.
        assert_eq!(heap.live_nodes(), TREEIFY_THRESHOLD);
    }

    #[test]
    fn test_tree_bucket_insert_update_remove() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(4);
        for i in 0..20 {
            table.set_val(&mut heap, i * 4 + 1, key(i), i);
        }
        assert_eq!(table.set_val(&mut heap, 5, key(1), 100), SetOutcome::Replaced(1));

        for i in (0..20).step_by(2) {
            assert_eq!(table.remove_node(&mut heap, i * 4 + 1, &key(i)), Some(i));
            let Bucket::Tree(root) = table.bucket(1) else {
                panic!("tree bucket reverted");
            };
            validate_tree(&heap, root);
        }
        for i in 0..20 {
            let expected = match i {
                1 => Some(100),
                _ if i % 2 == 1 => Some(i),
                _ => None,
            };
            assert_eq!(table.get(&heap, i * 4 + 1, &key(i)).copied(), expected);
        }
    }

    #[test]
    fn test_tree_never_reverts_to_chain() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        for i in 0..8 {
            table.set_val(&mut heap, i * 8, key(i), i);
        }
        for i in 1..8 {
            table.remove_node(&mut heap, i * 8, &key(i));
        }
        assert!(matches!(table.bucket(0), Bucket::Tree(_)));
        assert_eq!(table.remove_node(&mut heap, 0, &key(0)), Some(0));
        assert_eq!(table.bucket(0), Bucket::Empty);
        assert_eq!(heap.live_nodes(), 0);
    }

    #[test]
    fn test_remove_middle_of_chain() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        for h in [2, 10, 18] {
            table.set_val(&mut heap, h, key(h), h);
        }
        let Bucket::Chain(head) = table.bucket(2) else {
            unreachable!()
        };
        let third = heap[head].next().and_then(|n| heap[n].next());

        assert_eq!(table.remove_node(&mut heap, 10, &key(10)), Some(10));
        assert_eq!(heap[head].next(), third);
        assert_eq!(chain_hashes(&table, &heap, 2), [2, 18]);
        assert_eq!(table.get(&heap, 2, &key(2)), Some(&2));
        assert_eq!(table.get(&heap, 18, &key(18)), Some(&18));
        assert_eq!(table.get(&heap, 10, &key(10)), None);
    }

    #[test]
    fn test_remove_chain_head_and_last() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        table.set_val(&mut heap, 2, key(2), 2);
        table.set_val(&mut heap, 10, key(10), 10);

        assert_eq!(table.remove_node(&mut heap, 2, &key(2)), Some(2));
        assert_eq!(chain_hashes(&table, &heap, 2), [10]);
        assert_eq!(table.remove_node(&mut heap, 10, &key(10)), Some(10));
        assert_eq!(table.bucket(2), Bucket::Empty);
    }

    #[test]
    fn test_remove_missing_leaves_others() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(4);
        for i in 0..12 {
            table.set_val(&mut heap, i, key(i), i);
        }
        let before: Vec<Bucket> = table.buckets().to_vec();

        assert_eq!(table.remove_node(&mut heap, 100, &key(100)), None);
        // Same hash as a live entry, different key.
        assert_eq!(table.remove_node(&mut heap, 5, &key(6)), None);

        assert_eq!(table.buckets(), &before[..]);
        for i in 0..12 {
            assert_eq!(table.get(&heap, i, &key(i)), Some(&i));
        }
    }

    #[test]
    fn test_resize_splits_on_old_capacity_bit() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(4);
        table.set_val(&mut heap, 1, key(1), 1);
        table.set_val(&mut heap, 5, key(5), 5);
        assert_eq!(chain_hashes(&table, &heap, 1), [1, 5]);

        let table = table.resize(&mut heap);
        assert_eq!(table.capacity(), 8);
        assert_eq!(chain_hashes(&table, &heap, 1), [1]);
        assert_eq!(chain_hashes(&table, &heap, 5), [5]);
        assert_eq!(table.get(&heap, 1, &key(1)), Some(&1));
        assert_eq!(table.get(&heap, 5, &key(5)), Some(&5));
    }

    #[test]
    fn test_resize_preserves_chain_order() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        let hashes = [3, 11, 19, 27, 35, 43, 51];
        for h in hashes {
            table.set_val(&mut heap, h, key(h), h);
        }
        let table = table.resize(&mut heap);
        assert_eq!(chain_hashes(&table, &heap, 3), [3, 19, 35, 51]);
        assert_eq!(chain_hashes(&table, &heap, 11), [11, 27, 43]);
        assert_eq!(heap.live_nodes(), hashes.len());
    }

    #[test]
    fn test_resize_single_node_chain_moves_directly() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(2);
        table.set_val(&mut heap, 7, key(7), 7);
        let Bucket::Chain(node) = table.bucket(1) else {
            unreachable!()
        };
        let table = table.resize(&mut heap).resize(&mut heap);
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.bucket(7), Bucket::Chain(node));
    }

    #[test]
    fn test_resize_divides_tree_bucket() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        for i in 0..16 {
            table.set_val(&mut heap, i * 8 + 2, key(i), i);
        }
        assert!(matches!(table.bucket(2), Bucket::Tree(_)));

        let table = table.resize(&mut heap);
        for index in [2, 10] {
            let Bucket::Tree(root) = table.bucket(index) else {
                panic!("bucket {index} should stay a tree");
            };
            assert_eq!(validate_tree(&heap, root), 8);
        }
        for i in 0..16 {
            assert_eq!(table.get(&heap, i * 8 + 2, &key(i)), Some(&i));
        }
        assert_eq!(table.stats(&heap).entries, 16);
    }

    #[test]
    fn test_resize_at_maximum_is_identity() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create_bounded(4, 4);
        for i in 0..10 {
            table.set_val(&mut heap, i, key(i), i);
        }
        let before: Vec<Bucket> = table.buckets().to_vec();
        let slots_at = table.buckets().as_ptr();

        let table = table.resize(&mut heap);
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.buckets().as_ptr(), slots_at);
        assert_eq!(table.buckets(), &before[..]);
        for i in 0..10 {
            assert_eq!(table.get(&heap, i, &key(i)), Some(&i));
        }
    }

    #[test]
    fn test_hole_probe_is_not_found() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        table.set_val(&mut heap, 0, key(0), 0);
        table.set_val(&mut heap, 0, TaggedValue::Undefined, 1);
        assert!(table.get_node(&heap, 0, &TaggedValue::Hole).is_none());
        assert_eq!(table.remove_node(&mut heap, 0, &TaggedValue::Hole), None);
        assert_eq!(table.stats(&heap).entries, 2);
    }

    #[test]
    fn test_hole_key_never_matches_on_set() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        assert!(table.set_val(&mut heap, 4, TaggedValue::Hole, 1).is_inserted());
        assert!(table.set_val(&mut heap, 4, TaggedValue::Hole, 2).is_inserted());
        assert_eq!(table.stats(&heap).entries, 2);
    }

    #[test]
    fn test_hole_keys_survive_treeify() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        for i in 0..10 {
            assert!(table.set_val(&mut heap, 0, TaggedValue::Hole, i).is_inserted());
        }
        assert!(matches!(table.bucket(0), Bucket::Tree(_)));
        assert_eq!(table.stats(&heap).entries, 10);
        assert_eq!(heap.live_nodes(), 10);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        for i in 0..20 {
            table.set_val(&mut heap, i, key(i), i);
        }
        table.clear();
        assert_eq!(table.capacity(), 8);
        assert!(table.buckets().iter().all(|b| *b == Bucket::Empty));
        assert_eq!(table.get(&heap, 3, &key(3)), None);
    }

    #[test]
    fn test_treeing_bin_directly() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(4);
        for h in [1, 5, 9] {
            table.set_val(&mut heap, h, key(h), h);
        }
        table.treeing_bin(&mut heap, 1);
        assert!(matches!(table.bucket(1), Bucket::Tree(_)));
        // Non-chain buckets are ignored.
        table.treeing_bin(&mut heap, 2);
        assert_eq!(table.bucket(2), Bucket::Empty);
        for h in [1, 5, 9] {
            assert_eq!(table.get(&heap, h, &key(h)), Some(&h));
        }
    }

    #[test]
    fn test_stats() {
        let mut heap = TestHeap::new();
        let mut table = TaggedHashArray::create(8);
        for i in 0..8 {
            table.set_val(&mut heap, i * 8, key(i), i);
        }
        table.set_val(&mut heap, 1, key(100), 0);
        table.set_val(&mut heap, 9, key(101), 0);

        let stats = table.stats(&heap);
        assert_eq!(stats.capacity, 8);
        assert_eq!(stats.entries, 10);
        assert_eq!(stats.tree_buckets, 1);
        assert_eq!(stats.chain_buckets, 1);
        assert_eq!(stats.empty_buckets, 6);
        assert_eq!(stats.longest_chain, 2);
        assert!(stats.deepest_tree >= 3);
    }
}
