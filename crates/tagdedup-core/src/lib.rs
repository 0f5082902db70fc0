#![warn(missing_docs)]

//! tagdedup core: in-memory dedup index for tagged time-series points.
//!
//! Add path: Point → Ignore-list filter → Intern (StringTable) → Sort by id → Varint entry → FingerprintSet
//!
//! A `DedupCache` multiplexes named buckets, each an independent `FingerprintSet` of canonical
//! entries backed by a chunked `BlobArena`, over one shared `StringTable`.

pub mod arena;
pub mod bitmap;
pub mod bucket;
pub mod cache;
pub mod canonical;
pub mod config;
pub mod error;
pub mod fingerprint_set;
pub mod point;
pub mod string_table;
pub mod varint;

pub use arena::{ArenaConfig, ArenaHandle, ArenaStats, BlobArena};
pub use bitmap::OccupancyBitmap;
pub use bucket::{AddOutcome, Bucket, BucketStats, CanonicalSet};
pub use cache::{CacheStats, DedupCache};
pub use canonical::{CanonicalEncoder, CanonicalEntry, EncodingLimits, IgnoreList};
pub use config::CacheConfig;
pub use error::{DedupError, DedupResult};
pub use fingerprint_set::{
    ChainHistogram, EntryEquals, EntryHash, FingerprintSet, SetStats, TableConfig,
};
pub use point::Point;
pub use string_table::{StringId, StringTable, StringTableStats};
