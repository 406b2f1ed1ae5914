//! Container configuration.

use crate::error::{Error, Result};
use crate::table::MAXIMUM_CAPACITY;

/// Configuration for [`TaggedHashMap`](crate::TaggedHashMap) and
/// [`TaggedHashSet`](crate::TaggedHashSet).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Number of buckets allocated up front. Must be a power of two.
    pub initial_capacity: usize,
    /// The table doubles once `len > capacity * load_factor`.
    pub load_factor: f32,
    /// Growth stops here; further inserts only lengthen buckets.
    pub maximum_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capacity: 16,
            load_factor: 0.75,
            maximum_capacity: MAXIMUM_CAPACITY,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if !self.initial_capacity.is_power_of_two() {
            return Err(Error::InvalidCapacity(self.initial_capacity));
        }
        if !self.maximum_capacity.is_power_of_two()
            || self.maximum_capacity < self.initial_capacity
            || self.maximum_capacity > MAXIMUM_CAPACITY
        {
            return Err(Error::InvalidMaximumCapacity {
                maximum: self.maximum_capacity,
                initial: self.initial_capacity,
                limit: MAXIMUM_CAPACITY,
            });
        }
        if !self.load_factor.is_finite() || self.load_factor <= 0.0 {
            return Err(Error::InvalidLoadFactor(self.load_factor));
        }
        Ok(())
    }

    /// Number of entries the table may hold before it doubles.
    #[inline]
    pub(crate) fn threshold(&self, capacity: usize) -> usize {
        (capacity as f64 * f64::from(self.load_factor)) as usize
    }
}
