//! Node heap: the allocator the hash table draws chain and tree nodes from.
//!
//! Nodes live in two slot arenas and are addressed by `(index, generation)`
//! handles instead of pointers. Handles stay valid across arena growth, and a
//! handle to a reclaimed node is detected instead of silently aliasing
//! whatever reuses the slot.
//!
//! A `&LinkedNode` or `&RbTreeNode` borrowed from the heap cannot be held
//! across `new_linked_node`/`new_tree_node`, because both take `&mut self`.
//! Callers keep handles across allocation points and re-read through them.

use std::ops::{Index, IndexMut};

use crate::error::{Error, Result};
use crate::linked::LinkedNode;
use crate::rbtree::RbTreeNode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    fn stale(self) -> Error {
        Error::StaleHandle {
            index: self.index,
            generation: self.generation,
        }
    }
}

/// Handle to a chain node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LinkedRef(Handle);

/// Handle to a red-black tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TreeRef(Handle);

// =============================================================================
// Slot arena
// =============================================================================

#[derive(Clone)]
struct Slot<T> {
    generation: u32,
    node: Option<T>,
}

#[derive(Clone)]
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
        }
    }

    fn alloc(&mut self, node: T) -> Handle {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none());
            slot.node = Some(node);
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        assert!(self.slots.len() < u32::MAX as usize, "node arena exhausted");
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Handle {
            index,
            generation: 0,
        }
    }

    #[inline]
    fn get(&self, h: Handle) -> Option<&T> {
        let slot = self.slots.get(h.index as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        slot.node.as_ref()
    }

    #[inline]
    fn get_mut(&mut self, h: Handle) -> Option<&mut T> {
        let slot = self.slots.get_mut(h.index as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn reclaim(&mut self, h: Handle) -> Option<T> {
        let slot = self.slots.get_mut(h.index as usize)?;
        if slot.generation != h.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(h.index);
        self.live -= 1;
        Some(node)
    }

    fn clear(&mut self) {
        self.free_list.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free_list.push(index as u32);
        }
        self.live = 0;
    }

    fn capacity(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Slot<T>>()
            + self.free_list.capacity() * std::mem::size_of::<u32>()
    }
}

// =============================================================================
// Heap
// =============================================================================

/// Owner of every chain and tree node used by one or more tables.
///
/// The table treats the heap as an external allocation service: it never
/// frees nodes itself except when an entry is removed or a chain is converted
/// into a tree, in which case the old node is handed back via `reclaim_*`.
#[derive(Clone)]
pub struct Heap<K, V> {
    linked: Arena<LinkedNode<K, V>>,
    tree: Arena<RbTreeNode<K, V>>,
}

impl<K, V> Heap<K, V> {
    pub fn new() -> Self {
        Self {
            linked: Arena::new(),
            tree: Arena::new(),
        }
    }

    pub fn new_linked_node(
        &mut self,
        hash: i32,
        key: K,
        value: V,
        next: Option<LinkedRef>,
    ) -> LinkedRef {
        LinkedRef(self.linked.alloc(LinkedNode::new(hash, key, value, next)))
    }

    pub fn new_tree_node(&mut self, hash: i32, key: K, value: V) -> TreeRef {
        TreeRef(self.tree.alloc(RbTreeNode::new(hash, key, value)))
    }

    pub fn try_linked(&self, node: LinkedRef) -> Result<&LinkedNode<K, V>> {
        self.linked.get(node.0).ok_or_else(|| node.0.stale())
    }

    pub fn try_tree(&self, node: TreeRef) -> Result<&RbTreeNode<K, V>> {
        self.tree.get(node.0).ok_or_else(|| node.0.stale())
    }

    /// Releases a chain node and returns its contents.
    pub fn reclaim_linked(&mut self, node: LinkedRef) -> Option<LinkedNode<K, V>> {
        self.linked.reclaim(node.0)
    }

    /// Releases a tree node and returns its contents.
    pub fn reclaim_tree(&mut self, node: TreeRef) -> Option<RbTreeNode<K, V>> {
        self.tree.reclaim(node.0)
    }

    /// Drops every node. All outstanding handles become stale.
    pub fn clear(&mut self) {
        self.linked.clear();
        self.tree.clear();
    }

    pub fn live_nodes(&self) -> usize {
        self.linked.live + self.tree.live
    }

    pub fn memory_usage(&self) -> usize {
        self.linked.capacity() + self.tree.capacity()
    }
}

impl<K, V> Default for Heap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Index<LinkedRef> for Heap<K, V> {
    type Output = LinkedNode<K, V>;

    #[inline]
    fn index(&self, node: LinkedRef) -> &Self::Output {
        match self.linked.get(node.0) {
            Some(n) => n,
            None => panic!("stale chain node handle {node:?}"),
        }
    }
}

impl<K, V> IndexMut<LinkedRef> for Heap<K, V> {
    #[inline]
    fn index_mut(&mut self, node: LinkedRef) -> &mut Self::Output {
        match self.linked.get_mut(node.0) {
            Some(n) => n,
            None => panic!("stale chain node handle {node:?}"),
        }
    }
}

impl<K, V> Index<TreeRef> for Heap<K, V> {
    type Output = RbTreeNode<K, V>;

    #[inline]
    fn index(&self, node: TreeRef) -> &Self::Output {
        match self.tree.get(node.0) {
            Some(n) => n,
            None => panic!("stale tree node handle {node:?}"),
        }
    }
}

impl<K, V> IndexMut<TreeRef> for Heap<K, V> {
    #[inline]
    fn index_mut(&mut self, node: TreeRef) -> &mut Self::Output {
        match self.tree.get_mut(node.0) {
            Some(n) => n,
            None => panic!("stale tree node handle {node:?}"),
        }
    }
}
