//! Error types for the dedup engine.

use thiserror::Error;

/// Result type alias for dedup operations.
pub type DedupResult<T> = Result<T, DedupError>;

/// Error variants for dedup operations.
#[derive(Debug, Error)]
pub enum DedupError {
    /// The canonical encoding (binary or display form) exceeds the size ceiling.
    #[error("Entry too large: {size} bytes exceeds limit of {limit} bytes")]
    EntryTooLarge {
        /// Size of the rejected encoding in bytes.
        size: usize,
        /// Configured ceiling in bytes.
        limit: usize,
    },

    /// The point carries more non-ignored attributes than the token ceiling.
    #[error("Too many attributes: {count} exceeds limit of {limit}")]
    TooManyAttributes {
        /// Number of non-ignored attributes presented.
        count: usize,
        /// Configured token ceiling.
        limit: usize,
    },

    /// A fingerprint set reached full occupancy and cannot grow further.
    ///
    /// This is a configuration error: the maximum table size is too small for the workload.
    #[error("Capacity exhausted: {entries} entries in a table of {table_size} slots at its maximum size")]
    CapacityExhausted {
        /// Entries held by the set.
        entries: u64,
        /// Current (and maximum) number of slots.
        table_size: usize,
    },

    /// Bytes handed to a fingerprint set are not a valid self-describing entry.
    #[error("Invalid entry: {reason}")]
    InvalidEntry {
        /// Description of the problem.
        reason: String,
    },

    /// Configuration values are inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DedupError {
    /// Whether the error leaves the engine unable to continue under its current configuration.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DedupError::CapacityExhausted { .. })
    }
}
