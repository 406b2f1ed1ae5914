//! # tagged-hash
//!
//! The storage engine behind a script runtime's `HashMap`/`HashSet`
//! containers: a hash table over tagged values whose buckets start as linked
//! chains and turn into red-black trees once a chain reaches
//! [`TREEIFY_THRESHOLD`] entries.
//!
//! - [`TaggedHashArray`] is the core table. It consumes caller-supplied
//!   32-bit hashes and draws nodes from an explicit [`Heap`].
//! - [`TaggedHashMap`] and [`TaggedHashSet`] wrap the table with size
//!   tracking and load-factor growth.
//!
//! ## Example
//!
//! ```rust
//! use tagged_hash::{TaggedHashMap, TaggedValue};
//!
//! let mut map: TaggedHashMap<TaggedValue, u64> = TaggedHashMap::new();
//! map.set(TaggedValue::from("hello"), 1);
//! map.set(TaggedValue::Int(7), 2);
//!
//! assert_eq!(map.get(&TaggedValue::from("hello")), Some(&1));
//! // Integral doubles are the same key as the matching int.
//! assert_eq!(map.get(&TaggedValue::Double(7.0)), Some(&2));
//! ```
//!
//! Driving the table directly:
//!
//! ```rust
//! use tagged_hash::{Bucket, Heap, TaggedHashArray, TaggedValue, TREEIFY_THRESHOLD};
//!
//! let mut heap = Heap::new();
//! let mut table = TaggedHashArray::create(8);
//! for i in 0..TREEIFY_THRESHOLD as i32 {
//!     // Every hash lands in bucket 0.
//!     table.set_val(&mut heap, i * 8, TaggedValue::Int(i), i);
//! }
//! assert!(matches!(table.bucket(0), Bucket::Tree(_)));
//! assert_eq!(table.get(&heap, 24, &TaggedValue::Int(3)), Some(&3));
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod heap;
pub mod linked;
pub mod map;
pub mod rbtree;
pub mod table;
pub mod value;

pub use config::Config;
pub use error::{Error, Result};
pub use heap::{Heap, LinkedRef, TreeRef};
pub use linked::LinkedNode;
pub use map::{Iter, Keys, TaggedHashMap, TaggedHashSet, Values};
pub use rbtree::RbTreeNode;
pub use table::{
    Bucket, NodeRef, SetOutcome, TableStats, TaggedHashArray, MAXIMUM_CAPACITY, TREEIFY_THRESHOLD,
};
pub use value::{ObjectId, TaggedKey, TaggedValue};

#[cfg(test)]
mod proptests;
