//! Tagged values and the key contract used by the hash table.
//!
//! The table never computes hashes or compares keys on its own. It goes
//! through [`TaggedKey`], which supplies `SameValue` equality, a total order
//! for keys that share a tree bucket, and the hash code.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Key contract for [`TaggedHashArray`](crate::TaggedHashArray).
///
/// `key_order` must return [`Ordering::Equal`] exactly when `same_value`
/// returns `true`, and keys that are `same_value` must produce the same
/// `hash_code`.
pub trait TaggedKey {
    /// `SameValue` equality: NaN equals NaN, `+0` and `-0` are distinct.
    fn same_value(&self, other: &Self) -> bool;

    /// Total order used to place keys with equal hashes inside a tree bucket.
    fn key_order(&self, other: &Self) -> Ordering;

    /// 32-bit hash consumed by the table.
    fn hash_code(&self) -> i32;

    /// Whether this key is the hole sentinel. A hole never matches a stored entry.
    #[inline]
    fn is_hole(&self) -> bool {
        false
    }
}

/// Identity of a heap object owned by the embedding runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

/// A runtime value as seen by the collection machinery.
#[derive(Clone, Debug)]
pub enum TaggedValue {
    /// Sentinel for "no value here".
    Hole,
    Undefined,
    Null,
    Boolean(bool),
    /// Inlined small integer.
    Int(i32),
    Double(f64),
    String(Rc<str>),
    Object(ObjectId),
}

impl TaggedValue {
    #[inline]
    pub fn is_hole(&self) -> bool {
        matches!(self, TaggedValue::Hole)
    }

    /// Numeric view of `Int` and `Double`; `None` for every other tag.
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            TaggedValue::Int(i) => Some(f64::from(i)),
            TaggedValue::Double(d) => Some(d),
            _ => None,
        }
    }

    #[inline]
    fn tag_rank(&self) -> u8 {
        match self {
            TaggedValue::Hole => 0,
            TaggedValue::Undefined => 1,
            TaggedValue::Null => 2,
            TaggedValue::Boolean(_) => 3,
            TaggedValue::Int(_) | TaggedValue::Double(_) => 4,
            TaggedValue::String(_) => 5,
            TaggedValue::Object(_) => 6,
        }
    }
}

/// All NaN payloads collapse to one so they compare and hash as the same value.
#[inline]
fn canonical_number(n: f64) -> f64 {
    if n.is_nan() {
        f64::NAN
    } else {
        n
    }
}

/// Integral doubles hash like the `Int` they equal, so `Int(1)` and
/// `Double(1.0)` land in the same bucket.
fn number_as_int(n: f64) -> Option<i32> {
    if n.fract() != 0.0 || n < f64::from(i32::MIN) || n > f64::from(i32::MAX) {
        return None;
    }
    if n == 0.0 && n.is_sign_negative() {
        return None;
    }
    Some(n as i32)
}

#[inline]
fn spread(h: u32) -> i32 {
    (h ^ (h >> 16)) as i32
}

fn fold_u64(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

impl TaggedKey for TaggedValue {
    #[inline]
    fn same_value(&self, other: &Self) -> bool {
        self.key_order(other) == Ordering::Equal
    }

    fn key_order(&self, other: &Self) -> Ordering {
        let by_tag = self.tag_rank().cmp(&other.tag_rank());
        if by_tag != Ordering::Equal {
            return by_tag;
        }
        match (self, other) {
            (TaggedValue::Boolean(a), TaggedValue::Boolean(b)) => a.cmp(b),
            (TaggedValue::String(a), TaggedValue::String(b)) => a.cmp(b),
            (TaggedValue::Object(a), TaggedValue::Object(b)) => a.cmp(b),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => canonical_number(x).total_cmp(&canonical_number(y)),
                // Hole, Undefined and Null carry no payload.
                _ => Ordering::Equal,
            },
        }
    }

    fn hash_code(&self) -> i32 {
        if let Some(n) = self.as_number() {
            if let Some(i) = number_as_int(n) {
                return spread(i as u32);
            }
            return spread(fold_u64(canonical_number(n).to_bits()));
        }

        let mut hasher = DefaultHasher::new();
        self.tag_rank().hash(&mut hasher);
        match self {
            TaggedValue::Boolean(b) => b.hash(&mut hasher),
            TaggedValue::String(s) => s.hash(&mut hasher),
            TaggedValue::Object(id) => id.hash(&mut hasher),
            _ => {}
        }
        spread(fold_u64(hasher.finish()))
    }

    #[inline]
    fn is_hole(&self) -> bool {
        TaggedValue::is_hole(self)
    }
}

impl PartialEq for TaggedValue {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

// `same_value` is reflexive, including for NaN.
impl Eq for TaggedValue {}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Hole => f.write_str("<hole>"),
            TaggedValue::Undefined => f.write_str("undefined"),
            TaggedValue::Null => f.write_str("null"),
            TaggedValue::Boolean(b) => write!(f, "{b}"),
            TaggedValue::Int(i) => write!(f, "{i}"),
            TaggedValue::Double(d) => write!(f, "{d}"),
            TaggedValue::String(s) => write!(f, "{s:?}"),
            TaggedValue::Object(ObjectId(id)) => write!(f, "<object #{id}>"),
        }
    }
}

impl From<i32> for TaggedValue {
    fn from(value: i32) -> Self {
        TaggedValue::Int(value)
    }
}

impl From<f64> for TaggedValue {
    fn from(value: f64) -> Self {
        TaggedValue::Double(value)
    }
}

impl From<bool> for TaggedValue {
    fn from(value: bool) -> Self {
        TaggedValue::Boolean(value)
    }
}

impl From<&str> for TaggedValue {
    fn from(value: &str) -> Self {
        TaggedValue::String(Rc::from(value))
    }
}

impl From<ObjectId> for TaggedValue {
    fn from(value: ObjectId) -> Self {
        TaggedValue::Object(value)
    }
}
