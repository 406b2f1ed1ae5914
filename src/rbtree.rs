//! Tree buckets: red-black trees ordered by `(hash, key_order)`.
//!
//! Every node carries the size of its subtree. Insert and delete follow the
//! textbook (CLRS) algorithms with parent links. Deletion relinks nodes
//! structurally, so a surviving node never has its key or hash rewritten.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::mem;

use crate::heap::{Heap, LinkedRef, TreeRef};
use crate::value::TaggedKey;

/// One entry of a tree bucket.
#[derive(Clone, Debug)]
pub struct RbTreeNode<K, V> {
    pub(crate) hash: i32,
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) red: bool,
    pub(crate) left: Option<TreeRef>,
    pub(crate) right: Option<TreeRef>,
    pub(crate) parent: Option<TreeRef>,
    /// Size of the subtree rooted here, this node included.
    pub(crate) count: u32,
}

impl<K, V> RbTreeNode<K, V> {
    pub(crate) fn new(hash: i32, key: K, value: V) -> Self {
        Self {
            hash,
            key,
            value,
            red: true,
            left: None,
            right: None,
            parent: None,
            count: 1,
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
    pub fn is_red(&self) -> bool {
        self.red
    }

    #[inline]
    pub fn left(&self) -> Option<TreeRef> {
        self.left
    }

    #[inline]
    pub fn right(&self) -> Option<TreeRef> {
        self.right
    }

    #[inline]
    pub fn parent(&self) -> Option<TreeRef> {
        self.parent
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Number of nodes on the longest root-to-leaf path.
    pub fn height(heap: &Heap<K, V>, root: TreeRef) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(root, 1usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            let n = &heap[node];
            for child in [n.left, n.right].into_iter().flatten() {
                stack.push((child, depth + 1));
            }
        }
        deepest
    }
}

#[inline]
fn compare<K: TaggedKey, V>(hash: i32, key: &K, node: &RbTreeNode<K, V>) -> Ordering {
    hash.cmp(&node.hash).then_with(|| key.key_order(&node.key))
}

// =============================================================================
// Structural editing
// =============================================================================

/// A tree being rebalanced: the heap plus the current root, which rotations
/// may replace.
struct Tree<'h, K, V> {
    heap: &'h mut Heap<K, V>,
    root: TreeRef,
}

impl<K, V> Tree<'_, K, V> {
    #[inline]
    fn parent(&self, node: TreeRef) -> Option<TreeRef> {
        self.heap[node].parent
    }

    #[inline]
    fn is_red(&self, node: Option<TreeRef>) -> bool {
        node.is_some_and(|n| self.heap[n].red)
    }

    #[inline]
    fn set_black(&mut self, node: Option<TreeRef>) {
        if let Some(n) = node {
            self.heap[n].red = false;
        }
    }

    #[inline]
    fn count_of(&self, node: Option<TreeRef>) -> u32 {
        node.map_or(0, |n| self.heap[n].count)
    }

    #[inline]
    fn update_count(&mut self, node: TreeRef) {
        let n = &self.heap[node];
        let count = 1 + self.count_of(n.left) + self.count_of(n.right);
        self.heap[node].count = count;
    }

    /// Points `parent`'s link that used to hold `old` at `new`, or makes
    /// `new` the root when `parent` is `None`.
    fn replace_child(&mut self, parent: Option<TreeRef>, old: TreeRef, new: Option<TreeRef>) {
        match parent {
            None => {
                debug_assert!(new.is_some(), "root replaced by an empty subtree");
                if let Some(n) = new {
                    self.root = n;
                }
            }
            Some(p) => {
                if self.heap[p].left == Some(old) {
                    self.heap[p].left = new;
                } else {
                    self.heap[p].right = new;
                }
            }
        }
    }

    fn rotate_left(&mut self, x: TreeRef) {
        let Some(y) = self.heap[x].right else {
            return;
        };
        let inner = self.heap[y].left;
        self.heap[x].right = inner;
        if let Some(b) = inner {
            self.heap[b].parent = Some(x);
        }
        let xp = self.heap[x].parent;
        self.heap[y].parent = xp;
        self.replace_child(xp, x, Some(y));
        self.heap[y].left = Some(x);
        self.heap[x].parent = Some(y);

        self.heap[y].count = self.heap[x].count;
        self.update_count(x);
    }

    fn rotate_right(&mut self, x: TreeRef) {
        let Some(y) = self.heap[x].left else {
            return;
        };
        let inner = self.heap[y].right;
        self.heap[x].left = inner;
        if let Some(b) = inner {
            self.heap[b].parent = Some(x);
        }
        let xp = self.heap[x].parent;
        self.heap[y].parent = xp;
        self.replace_child(xp, x, Some(y));
        self.heap[y].right = Some(x);
        self.heap[x].parent = Some(y);

        self.heap[y].count = self.heap[x].count;
        self.update_count(x);
    }

    fn minimum(&self, mut node: TreeRef) -> TreeRef {
        while let Some(l) = self.heap[node].left {
            node = l;
        }
        node
    }

    /// Hangs a detached red node under `parent` and restores the invariants.
    fn link(&mut self, parent: TreeRef, go_left: bool, node: TreeRef) {
        self.heap[node].parent = Some(parent);
        if go_left {
            self.heap[parent].left = Some(node);
        } else {
            self.heap[parent].right = Some(node);
        }

        let mut up = Some(parent);
        while let Some(n) = up {
            self.heap[n].count += 1;
            up = self.heap[n].parent;
        }

        self.insert_fixup(node);
    }

    fn insert_fixup(&mut self, mut z: TreeRef) {
        while let Some(p) = self.parent(z).filter(|&p| self.heap[p].red) {
            // A red parent is never the root, so the grandparent exists.
            let Some(g) = self.parent(p) else {
                break;
            };
            if self.heap[g].left == Some(p) {
                let uncle = self.heap[g].right;
                if self.is_red(uncle) {
                    self.heap[p].red = false;
                    self.set_black(uncle);
                    self.heap[g].red = true;
                    z = g;
                } else {
                    let mut p = p;
                    if self.heap[p].right == Some(z) {
                        self.rotate_left(p);
                        mem::swap(&mut p, &mut z);
                    }
                    self.heap[p].red = false;
                    self.heap[g].red = true;
                    self.rotate_right(g);
                }
            } else {
                let uncle = self.heap[g].left;
                if self.is_red(uncle) {
                    self.heap[p].red = false;
                    self.set_black(uncle);
                    self.heap[g].red = true;
                    z = g;
                } else {
                    let mut p = p;
                    if self.heap[p].left == Some(z) {
                        self.rotate_right(p);
                        mem::swap(&mut p, &mut z);
                    }
                    self.heap[p].red = false;
                    self.heap[g].red = true;
                    self.rotate_left(g);
                }
            }
        }
        let root = self.root;
        self.heap[root].red = false;
    }

    /// Unlinks `z` (which must not be the only node) and rebalances.
    fn unlink(&mut self, z: TreeRef) {
        let z_left = self.heap[z].left;
        let z_right = self.heap[z].right;
        let z_parent = self.heap[z].parent;
        let mut removed_red = self.heap[z].red;

        let (x, x_parent) = match (z_left, z_right) {
            (None, child) | (child, None) => {
                self.replace_child(z_parent, z, child);
                if let Some(c) = child {
                    self.heap[c].parent = z_parent;
                }
                (child, z_parent)
            }
            (Some(l), Some(r)) => {
                let y = self.minimum(r);
                removed_red = self.heap[y].red;
                let x = self.heap[y].right;
                let x_parent = if self.heap[y].parent == Some(z) {
                    Some(y)
                } else {
                    let yp = self.heap[y].parent;
                    self.replace_child(yp, y, x);
                    if let Some(c) = x {
                        self.heap[c].parent = yp;
                    }
                    self.heap[y].right = Some(r);
                    self.heap[r].parent = Some(y);
                    yp
                };
                self.replace_child(z_parent, z, Some(y));
                self.heap[y].parent = z_parent;
                self.heap[y].left = Some(l);
                self.heap[l].parent = Some(y);
                self.heap[y].red = self.heap[z].red;
                (x, x_parent)
            }
        };

        let detached = &mut self.heap[z];
        detached.left = None;
        detached.right = None;
        detached.parent = None;

        let mut up = x_parent;
        while let Some(n) = up {
            self.update_count(n);
            up = self.heap[n].parent;
        }

        if !removed_red {
            self.delete_fixup(x, x_parent);
        }
    }

    fn delete_fixup(&mut self, mut x: Option<TreeRef>, mut parent: Option<TreeRef>) {
        while x != Some(self.root) && !self.is_red(x) {
            let Some(p) = parent else {
                break;
            };
            if x == self.heap[p].left {
                let Some(mut w) = self.heap[p].right else {
                    break;
                };
                if self.heap[w].red {
                    self.heap[w].red = false;
                    self.heap[p].red = true;
                    self.rotate_left(p);
                    match self.heap[p].right {
                        Some(n) => w = n,
                        None => break,
                    }
                }
                if !self.is_red(self.heap[w].left) && !self.is_red(self.heap[w].right) {
                    self.heap[w].red = true;
                    x = Some(p);
                    parent = self.heap[p].parent;
                } else {
                    if !self.is_red(self.heap[w].right) {
                        let nephew = self.heap[w].left;
                        self.set_black(nephew);
                        self.heap[w].red = true;
                        self.rotate_right(w);
                        match self.heap[p].right {
                            Some(n) => w = n,
                            None => break,
                        }
                    }
                    self.heap[w].red = self.heap[p].red;
                    self.heap[p].red = false;
                    let nephew = self.heap[w].right;
                    self.set_black(nephew);
                    self.rotate_left(p);
                    x = Some(self.root);
                    parent = None;
                }
            } else {
                let Some(mut w) = self.heap[p].left else {
                    break;
                };
                if self.heap[w].red {
                    self.heap[w].red = false;
                    self.heap[p].red = true;
                    self.rotate_right(p);
                    match self.heap[p].left {
                        Some(n) => w = n,
                        None => break,
                    }
                }
                if !self.is_red(self.heap[w].right) && !self.is_red(self.heap[w].left) {
                    self.heap[w].red = true;
                    x = Some(p);
                    parent = self.heap[p].parent;
                } else {
                    if !self.is_red(self.heap[w].left) {
                        let nephew = self.heap[w].right;
                        self.set_black(nephew);
                        self.heap[w].red = true;
                        self.rotate_left(w);
                        match self.heap[p].left {
                            Some(n) => w = n,
                            None => break,
                        }
                    }
                    self.heap[w].red = self.heap[p].red;
                    self.heap[p].red = false;
                    let nephew = self.heap[w].left;
                    self.set_black(nephew);
                    self.rotate_right(p);
                    x = Some(self.root);
                    parent = None;
                }
            }
        }
        self.set_black(x);
    }
}

// =============================================================================
// Bucket operations
// =============================================================================

impl<K: TaggedKey, V> RbTreeNode<K, V> {
    pub fn find(heap: &Heap<K, V>, root: TreeRef, hash: i32, key: &K) -> Option<TreeRef> {
        if key.is_hole() {
            return None;
        }
        let mut current = Some(root);
        while let Some(node) = current {
            let n = &heap[node];
            current = match compare(hash, key, n) {
                Ordering::Equal => return Some(node),
                Ordering::Less => n.left,
                Ordering::Greater => n.right,
            };
        }
        None
    }

    /// Inserts or updates `key`. Returns the (black) root and the replaced
    /// value, if any.
    pub fn set(
        heap: &mut Heap<K, V>,
        root: Option<TreeRef>,
        hash: i32,
        key: K,
        value: V,
    ) -> (TreeRef, Option<V>) {
        let Some(root) = root else {
            let node = heap.new_tree_node(hash, key, value);
            heap[node].red = false;
            return (node, None);
        };

        let mut parent = root;
        let go_left = loop {
            let n = &mut heap[parent];
            let next = match compare(hash, &key, n) {
                // A hole never matches, so it is always a new entry.
                Ordering::Equal if key.is_hole() => n.right.ok_or(false),
                Ordering::Equal => {
                    let old = mem::replace(&mut n.value, value);
                    return (root, Some(old));
                }
                Ordering::Less => n.left.ok_or(true),
                Ordering::Greater => n.right.ok_or(false),
            };
            match next {
                Ok(child) => parent = child,
                Err(go_left) => break go_left,
            }
        };

        let node = heap.new_tree_node(hash, key, value);
        let mut tree = Tree { heap, root };
        tree.link(parent, go_left, node);
        (tree.root, None)
    }

    /// Removes `key`. Returns the new root (`None` once the tree is empty)
    /// and the removed value.
    pub fn remove(
        heap: &mut Heap<K, V>,
        root: TreeRef,
        hash: i32,
        key: &K,
    ) -> (Option<TreeRef>, Option<V>) {
        let Some(z) = Self::find(heap, root, hash, key) else {
            return (Some(root), None);
        };

        let root = if heap[root].count == 1 {
            None
        } else {
            let mut tree = Tree { heap: &mut *heap, root };
            tree.unlink(z);
            let root = tree.root;
            heap[root].red = false;
            Some(root)
        };
        (root, heap.reclaim_tree(z).map(|n| n.value))
    }

    /// Splits a tree on `hash & bit` into a low and a high tree.
    ///
    /// Nodes are visited breadth first, detached, and relinked into their
    /// half. No node is allocated or freed.
    pub fn divide(
        heap: &mut Heap<K, V>,
        root: TreeRef,
        bit: usize,
    ) -> (Option<TreeRef>, Option<TreeRef>) {
        let mut lo: Option<TreeRef> = None;
        let mut hi: Option<TreeRef> = None;

        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(node) = queue.pop_front() {
            let n = &mut heap[node];
            queue.extend(n.left);
            queue.extend(n.right);
            n.left = None;
            n.right = None;
            n.parent = None;
            n.red = true;
            n.count = 1;

            let half = if (n.hash as u32 as usize) & bit == 0 {
                &mut lo
            } else {
                &mut hi
            };
            *half = Some(Self::attach(heap, *half, node));
        }
        (lo, hi)
    }

    /// Inserts an already allocated, detached node whose key is not present.
    fn attach(heap: &mut Heap<K, V>, root: Option<TreeRef>, node: TreeRef) -> TreeRef {
        let Some(root) = root else {
            heap[node].red = false;
            return node;
        };

        let mut parent = root;
        let go_left = loop {
            let n = &heap[node];
            let p = &heap[parent];
            let (next, go_left) = match compare(n.hash, &n.key, p) {
                Ordering::Less | Ordering::Equal => (p.left, true),
                Ordering::Greater => (p.right, false),
            };
            match next {
                Some(child) => parent = child,
                None => break go_left,
            }
        };

        let mut tree = Tree { heap, root };
        tree.link(parent, go_left, node);
        tree.root
    }

    /// Builds a tree holding the entries of the chain at `head`, inserted in
    /// chain order. The chain nodes are reclaimed.
    pub fn treeify(heap: &mut Heap<K, V>, head: LinkedRef) -> Option<TreeRef> {
        let mut root = None;
        let mut current = Some(head);
        while let Some(node) = current {
            let Some(entry) = heap.reclaim_linked(node) else {
                break;
            };
            current = entry.next;
            let (r, replaced) = Self::set(heap, root, entry.hash, entry.key, entry.value);
            debug_assert!(replaced.is_none(), "duplicate key in chain");
            root = Some(r);
        }
        root
    }
}

/// Checks the red-black and subtree-count invariants; returns the node count.
#[cfg(test)]
pub(crate) fn validate_tree<K: TaggedKey, V>(heap: &Heap<K, V>, root: TreeRef) -> usize {
    fn walk<K: TaggedKey, V>(
        heap: &Heap<K, V>,
        node: Option<TreeRef>,
        parent: Option<TreeRef>,
    ) -> (u32, usize) {
        let Some(node) = node else {
            return (0, 1);
        };
        let n = &heap[node];
        assert_eq!(n.parent, parent, "parent link mismatch");
        if n.red {
            assert!(
                !n.left.is_some_and(|c| heap[c].red) && !n.right.is_some_and(|c| heap[c].red),
                "red node with a red child"
            );
        }
        for (child, expected) in [(n.left, Ordering::Less), (n.right, Ordering::Greater)] {
            if let Some(c) = child {
                assert_eq!(
                    compare(heap[c].hash, &heap[c].key, n),
                    expected,
                    "search order violated"
                );
            }
        }
        let (lc, lb) = walk(heap, n.left, Some(node));
        let (rc, rb) = walk(heap, n.right, Some(node));
        assert_eq!(lb, rb, "black height mismatch");
        assert_eq!(n.count, 1 + lc + rc, "subtree count mismatch");
        (n.count, lb + usize::from(!n.red))
    }

    assert!(!heap[root].red, "root must be black");
    let (count, _) = walk(heap, Some(root), None);
    count as usize
}
