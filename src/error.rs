//! Recoverable failures.
//!
//! Precondition violations on the table itself (a zero or non-power-of-two
//! capacity passed to [`TaggedHashArray::create`](crate::TaggedHashArray::create))
//! are programmer errors and panic. Lookups that miss return `None`.

/// Errors surfaced by configuration and by checked heap access.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("capacity must be a non-zero power of two, got {0}")]
    InvalidCapacity(usize),

    #[error("maximum capacity {maximum} must be a power of two in {initial}..={limit}")]
    InvalidMaximumCapacity {
        maximum: usize,
        initial: usize,
        limit: usize,
    },

    #[error("load factor must be finite and positive, got {0}")]
    InvalidLoadFactor(f32),

    #[error("stale node handle (index {index}, generation {generation})")]
    StaleHandle { index: u32, generation: u32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
