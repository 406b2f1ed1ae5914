//! Chain buckets: singly linked entries sharing one slot.

use crate::heap::{Heap, LinkedRef};
use crate::value::TaggedKey;

/// One entry of a chain bucket.
#[derive(Clone, Debug)]
pub struct LinkedNode<K, V> {
    pub(crate) hash: i32,
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: Option<LinkedRef>,
}

impl<K, V> LinkedNode<K, V> {
    pub(crate) fn new(hash: i32, key: K, value: V, next: Option<LinkedRef>) -> Self {
        Self {
            hash,
            key,
            value,
            next,
        }
    }

    #[inline]
    pub fn hash(&self) -> i32 {
        self.hash
    }

    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn next(&self) -> Option<LinkedRef> {
        self.next
    }

    /// Number of nodes reachable from `head`, `head` included.
    pub fn len(heap: &Heap<K, V>, head: LinkedRef) -> usize {
        let mut n = 0;
        let mut current = Some(head);
        while let Some(node) = current {
            n += 1;
            current = heap[node].next;
        }
        n
    }

    /// Splits the chain on `hash & bit`, keeping the original relative order
    /// inside each half. Nodes are relinked, never copied.
    ///
    /// Returns `(low, high)`: the entries with the bit clear and set.
    pub fn disperse(
        heap: &mut Heap<K, V>,
        head: LinkedRef,
        bit: usize,
    ) -> (Option<LinkedRef>, Option<LinkedRef>) {
        let mut lo_head: Option<LinkedRef> = None;
        let mut lo_tail: Option<LinkedRef> = None;
        let mut hi_head: Option<LinkedRef> = None;
        let mut hi_tail: Option<LinkedRef> = None;

        let mut current = Some(head);
        while let Some(node) = current {
            current = heap[node].next;
            let (first, last) = if (heap[node].hash as u32 as usize) & bit == 0 {
                (&mut lo_head, &mut lo_tail)
            } else {
                (&mut hi_head, &mut hi_tail)
            };
            match *last {
                Some(tail) => heap[tail].next = Some(node),
                None => *first = Some(node),
            }
            *last = Some(node);
        }

        if let Some(t) = lo_tail {
            heap[t].next = None;
        }
        if let Some(t) = hi_tail {
            heap[t].next = None;
        }
        (lo_head, hi_head)
    }
}

impl<K: TaggedKey, V> LinkedNode<K, V> {
    /// Hash first, `SameValue` only on a hash match.
    #[inline]
    pub(crate) fn matches(&self, hash: i32, key: &K) -> bool {
        self.hash == hash && !key.is_hole() && self.key.same_value(key)
    }

    pub fn find(heap: &Heap<K, V>, head: LinkedRef, hash: i32, key: &K) -> Option<LinkedRef> {
        let mut current = Some(head);
        while let Some(node) = current {
            let n = &heap[node];
            if n.matches(hash, key) {
                return Some(node);
            }
            current = n.next;
        }
        None
    }
}
