//! A bucket: the dedup index for one named namespace.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::arena::ArenaConfig;
use crate::canonical::{
    CanonicalEncoder, CanonicalEquals, CanonicalHash, EncodingLimits, IgnoreList,
};
use crate::error::DedupResult;
use crate::fingerprint_set::{FingerprintSet, SetStats, TableConfig};
use crate::point::Point;
use crate::string_table::StringTable;

/// Fingerprint set specialised to canonical attribute entries.
pub type CanonicalSet = FingerprintSet<CanonicalHash, CanonicalEquals>;

/// Result of adding a point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOutcome {
    /// The point's attribute set had not been seen in this bucket.
    pub is_new: bool,
    /// Canonical `tag=value,...` rendering, when requested.
    pub display: Option<String>,
}

/// Per-bucket statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    /// Distinct attribute sets held.
    pub entries: u64,
    /// Adds that stored a new entry.
    pub adds: u64,
    /// Adds that found an existing entry.
    pub duplicates: u64,
    /// Adds rejected by canonicalization limits.
    pub rejected: u64,
    /// Fingerprint set layout and memory.
    pub set: SetStats,
}

/// Dedup index for one namespace: a canonical encoder in front of a fingerprint set.
pub struct Bucket {
    encoder: CanonicalEncoder,
    set: CanonicalSet,
    adds: u64,
    duplicates: u64,
    rejected: u64,
}

impl Bucket {
    /// Creates an empty bucket.
    pub fn new(
        table: TableConfig,
        arena: ArenaConfig,
        limits: EncodingLimits,
        ignored: Arc<IgnoreList>,
    ) -> Self {
        Self {
            encoder: CanonicalEncoder::new(limits, ignored),
            set: FingerprintSet::new(table, arena),
            adds: 0,
            duplicates: 0,
            rejected: 0,
        }
    }

    /// Records `point`, reporting whether its attribute set is new to this bucket.
    ///
    /// On error the bucket's contents are unchanged.
    pub fn add<P>(
        &mut self,
        strings: &mut StringTable,
        point: &P,
        want_display: bool,
    ) -> DedupResult<AddOutcome>
    where
        P: Point + ?Sized,
    {
        let entry = match self.encoder.encode(strings, point, want_display) {
            Ok(entry) => entry,
            Err(e) => {
                self.rejected += 1;
                return Err(e);
            }
        };

        let is_new = self.set.insert(&entry.bytes)?;
        if is_new {
            self.adds += 1;
        } else {
            self.duplicates += 1;
        }
        trace!(is_new, entry_len = entry.bytes.len(), "bucket add");

        Ok(AddOutcome {
            is_new,
            display: entry.display,
        })
    }

    /// Whether `point`'s attribute set is present.
    ///
    /// A point that fails canonicalization can never have been stored, so it is absent.
    pub fn contains<P>(&self, strings: &mut StringTable, point: &P) -> bool
    where
        P: Point + ?Sized,
    {
        match self.encoder.encode(strings, point, false) {
            Ok(entry) => self.set.contains(&entry.bytes),
            Err(e) => {
                trace!(error = %e, "lookup of non-canonicalizable point");
                false
            }
        }
    }

    /// Removes `point`'s attribute set, returning whether it was present.
    pub fn remove<P>(&mut self, strings: &mut StringTable, point: &P) -> bool
    where
        P: Point + ?Sized,
    {
        match self.encoder.encode(strings, point, false) {
            Ok(entry) => self.set.erase(&entry.bytes),
            Err(e) => {
                trace!(error = %e, "remove of non-canonicalizable point ignored");
                false
            }
        }
    }

    /// Distinct attribute sets held.
    pub fn len(&self) -> u64 {
        self.set.len()
    }

    /// Whether the bucket holds nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// The ignore-list fixed at creation.
    pub fn ignored(&self) -> &IgnoreList {
        self.encoder.ignored()
    }

    /// Raw canonical entries held, in spine order.
    pub fn entries(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.set.entries()
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> BucketStats {
        BucketStats {
            entries: self.set.len(),
            adds: self.adds,
            duplicates: self.duplicates,
            rejected: self.rejected,
            set: self.set.stats(),
        }
    }
}
