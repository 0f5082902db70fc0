//! Bucket-multiplexing dedup cache.
//!
//! Routes every operation to the bucket named by the caller, creating buckets lazily on
//! first `add`. The cache owns the single `StringTable` shared by all of its buckets; that
//! table lives as long as the cache and is never shrunk, even when buckets are dropped.
//!
//! All operations are synchronous and assume exclusive access (`&mut self`). Hosts that run
//! on many threads must funnel calls for one cache through a single executor.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bucket::{AddOutcome, Bucket, BucketStats};
use crate::canonical::IgnoreList;
use crate::config::CacheConfig;
use crate::error::DedupResult;
use crate::point::Point;
use crate::string_table::{StringTable, StringTableStats};

/// Statistics for a whole cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Shared string table statistics.
    pub strings: StringTableStats,
    /// Per-bucket statistics, keyed by bucket name.
    pub buckets: BTreeMap<String, BucketStats>,
}

impl CacheStats {
    /// Entries summed over every bucket.
    pub fn total_entries(&self) -> u64 {
        self.buckets.values().map(|b| b.entries).sum()
    }

    /// Bytes held by every bucket's spine, bitmap and arena.
    pub fn total_bytes(&self) -> u64 {
        self.buckets.values().map(|b| b.set.total_bytes).sum()
    }
}

/// Maps bucket names to independent dedup indexes over one shared string table.
pub struct DedupCache {
    config: CacheConfig,
    ignored: Arc<IgnoreList>,
    strings: StringTable,
    buckets: HashMap<String, Bucket>,
}

impl DedupCache {
    /// Creates an empty cache after validating `config`.
    pub fn new(config: CacheConfig) -> DedupResult<Self> {
        config.validate()?;
        let ignored = Arc::new(IgnoreList::new(config.ignored_attributes.iter().cloned()));
        info!(
            ignored = ignored.len(),
            initial_table_size = config.table.initial_table_size,
            max_table_size = config.table.max_table_size,
            "created dedup cache"
        );
        Ok(Self {
            config,
            ignored,
            strings: StringTable::new(),
            buckets: HashMap::new(),
        })
    }

    /// Sets the ignore-list for buckets created from now on.
    ///
    /// Existing buckets keep the list that was active when they were created.
    pub fn configure<I, S>(&mut self, ignored_attributes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ignored = IgnoreList::new(ignored_attributes);
        self.config.ignored_attributes = ignored.to_sorted_vec();
        debug!(ignored = ignored.len(), "reconfigured ignore-list");
        self.ignored = Arc::new(ignored);
    }

    /// Records `point` in `bucket`, creating the bucket on first use.
    pub fn add<P>(&mut self, bucket: &str, point: &P, want_display: bool) -> DedupResult<AddOutcome>
    where
        P: Point + ?Sized,
    {
        if let Some(b) = self.buckets.get_mut(bucket) {
            return b.add(&mut self.strings, point, want_display);
        }

        debug!(bucket, "creating bucket");
        let mut created = Bucket::new(
            self.config.table.clone(),
            self.config.arena.clone(),
            self.config.limits.clone(),
            Arc::clone(&self.ignored),
        );
        let outcome = created.add(&mut self.strings, point, want_display);
        self.buckets.insert(bucket.to_string(), created);
        outcome
    }

    /// Whether `point` has been recorded in `bucket`. Unknown buckets hold nothing.
    pub fn contains<P>(&mut self, bucket: &str, point: &P) -> bool
    where
        P: Point + ?Sized,
    {
        match self.buckets.get(bucket) {
            Some(b) => b.contains(&mut self.strings, point),
            None => false,
        }
    }

    /// Removes `point` from `bucket`, returning whether it was present.
    pub fn remove<P>(&mut self, bucket: &str, point: &P) -> bool
    where
        P: Point + ?Sized,
    {
        match self.buckets.get_mut(bucket) {
            Some(b) => b.remove(&mut self.strings, point),
            None => false,
        }
    }

    /// Destroys `bucket` and its storage, returning whether it existed.
    ///
    /// Strings interned on its behalf stay in the shared table.
    pub fn drop_bucket(&mut self, bucket: &str) -> bool {
        let dropped = self.buckets.remove(bucket);
        if let Some(b) = &dropped {
            debug!(bucket, entries = b.len(), "dropped bucket");
        }
        dropped.is_some()
    }

    /// Snapshot of bucket names, in no particular order.
    pub fn list_buckets(&self) -> Vec<String> {
        self.buckets.keys().cloned().collect()
    }

    /// Entries held by `bucket`, or `None` if it does not exist.
    pub fn bucket_len(&self, bucket: &str) -> Option<u64> {
        self.buckets.get(bucket).map(Bucket::len)
    }

    /// Read access to a bucket.
    pub fn bucket(&self, bucket: &str) -> Option<&Bucket> {
        self.buckets.get(bucket)
    }

    /// The shared string table.
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    /// Active configuration, including the current ignore-list.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            strings: self.strings.stats(),
            buckets: self
                .buckets
                .iter()
                .map(|(name, b)| (name.clone(), b.stats()))
                .collect(),
        }
    }
}
