//! Open-addressing hash set over self-describing byte entries.
//!
//! The spine is a flat array of `ArenaHandle`s; the entry bytes live once in a `BlobArena`.
//! A parallel `OccupancyBitmap` marks which slots hold a valid handle, independent of the
//! handle value. Collisions are resolved by linear probing, wrapping modulo the current
//! table size.
//!
//! # Invariants
//! - A slot's occupancy bit is set if and only if the slot holds a valid handle.
//! - At least one slot is always empty, so every probe terminates.
//! - No entry is separated from its home slot by an empty slot (erase shifts entries back).
//!
//! # Resize protocol
//! Occupancy (`100 * len / table_size`) is evaluated after every insert. Above
//! `resize_threshold_pct`, while below `max_table_size`, the table doubles and every entry is
//! rehashed into a fresh spine and bitmap before control returns. An insert that would fill
//! the last free slot of a table at its maximum size fails with `CapacityExhausted`.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::arena::{ArenaConfig, ArenaHandle, ArenaStats, BlobArena};
use crate::bitmap::OccupancyBitmap;
use crate::error::{DedupError, DedupResult};

/// Hash policy for fingerprint set entries.
pub trait EntryHash {
    /// Hashes the exact bytes of an entry.
    fn hash(entry: &[u8]) -> u64;
}

/// Equality and extent policy for fingerprint set entries.
pub trait EntryEquals {
    /// Length of the entry beginning at `stored[0]`, recovered from its own content.
    ///
    /// Returns `None` if the bytes do not start with a well-formed entry.
    fn stored_len(stored: &[u8]) -> Option<usize>;

    /// Compares a stored entry with a candidate; both slices are exact entry extents.
    fn equals(stored: &[u8], candidate: &[u8]) -> bool {
        stored == candidate
    }
}

/// Sizing of a fingerprint set's spine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Number of slots allocated up front (default 4096).
    pub initial_table_size: usize,
    /// Upper bound on the number of slots (default 512Mi).
    pub max_table_size: usize,
    /// Occupancy percentage above which the table doubles (default 70).
    pub resize_threshold_pct: u8,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_table_size: 4 << 10,
            max_table_size: 512 << 20,
            resize_threshold_pct: 70,
        }
    }
}

/// Distribution of probe cluster lengths (maximal runs of occupied slots).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHistogram {
    /// Clusters of 1 or 2 slots.
    pub len_1_2: u64,
    /// Clusters of 3 to 5 slots.
    pub len_3_5: u64,
    /// Clusters of 6 to 9 slots.
    pub len_6_9: u64,
    /// Clusters of 10 slots or more.
    pub len_10_plus: u64,
}

impl ChainHistogram {
    fn record(&mut self, len: u64) {
        match len {
            0 => {}
            1..=2 => self.len_1_2 += 1,
            3..=5 => self.len_3_5 += 1,
            6..=9 => self.len_6_9 += 1,
            _ => self.len_10_plus += 1,
        }
    }

    /// Total number of clusters recorded.
    pub fn clusters(&self) -> u64 {
        self.len_1_2 + self.len_3_5 + self.len_6_9 + self.len_10_plus
    }
}

/// Snapshot of a fingerprint set's layout and memory use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetStats {
    /// Number of spine slots.
    pub spine_len: u64,
    /// Number of occupied spine slots.
    pub spine_use: u64,
    /// Number of entries in the set.
    pub entries: u64,
    /// Bytes used by the spine.
    pub spine_bytes: u64,
    /// Bytes used by the occupancy bitmap.
    pub bitmap_bytes: u64,
    /// Entries stored away from their home slot.
    pub collision_slots: u64,
    /// Sum of all probe cluster lengths.
    pub total_chain_len: u64,
    /// Longest probe cluster.
    pub max_chain_len: u64,
    /// Mean probe cluster length (0 when empty).
    pub avg_chain_len: f64,
    /// Histogram of probe cluster lengths.
    pub chain_histogram: ChainHistogram,
    /// Number of resizes performed.
    pub resizes: u64,
    /// Arena memory statistics.
    pub arena: ArenaStats,
    /// Spine, bitmap and arena allocation combined.
    pub total_bytes: u64,
}

/// Set of opaque self-describing byte entries with at-most-one-copy semantics.
pub struct FingerprintSet<H, E> {
    config: TableConfig,
    table_size: usize,
    spine: Vec<ArenaHandle>,
    occupied: OccupancyBitmap,
    len: u64,
    arena: BlobArena,
    resizes: u64,
    _policy: PhantomData<fn() -> (H, E)>,
}

impl<H, E> FingerprintSet<H, E>
where
    H: EntryHash,
    E: EntryEquals,
{
    /// Creates an empty set with `table.initial_table_size` slots.
    ///
    /// Sizes are expected to have passed `CacheConfig::validate`; a zero initial size is
    /// bumped to 2 slots.
    pub fn new(table: TableConfig, arena: ArenaConfig) -> Self {
        let table_size = table.initial_table_size.max(2);
        Self {
            config: table,
            table_size,
            spine: vec![ArenaHandle::default(); table_size],
            occupied: OccupancyBitmap::new(table_size),
            len: 0,
            arena: BlobArena::with_config(arena),
            resizes: 0,
            _policy: PhantomData,
        }
    }

    /// Inserts `entry`, returning `true` if it was not already present.
    pub fn insert(&mut self, entry: &[u8]) -> DedupResult<bool> {
        Self::validate(entry)?;

        if self.find(entry).is_some() {
            return Ok(false);
        }

        if self.len + 1 >= self.table_size as u64 {
            if self.table_size < self.config.max_table_size {
                self.resize();
            } else {
                error!(
                    entries = self.len,
                    table_size = self.table_size,
                    "fingerprint set is full"
                );
                return Err(DedupError::CapacityExhausted {
                    entries: self.len,
                    table_size: self.table_size,
                });
            }
        }

        let home = self.home(entry, self.table_size);
        let slot = first_free(&self.occupied, self.table_size, home).ok_or(
            DedupError::CapacityExhausted {
                entries: self.len,
                table_size: self.table_size,
            },
        )?;

        self.spine[slot] = self.arena.append(entry);
        self.occupied.set(slot);
        self.len += 1;

        self.maybe_resize();
        Ok(true)
    }

    /// Whether `entry` is present.
    pub fn contains(&self, entry: &[u8]) -> bool {
        self.find(entry).is_some()
    }

    /// Removes `entry` if present, returning whether it was.
    ///
    /// The arena bytes of the removed entry are not reclaimed.
    pub fn erase(&mut self, entry: &[u8]) -> bool {
        let Some(slot) = self.find(entry) else {
            return false;
        };

        self.occupied.clear(slot);
        self.spine[slot] = ArenaHandle::default();
        self.len -= 1;

        // Backward-shift the rest of the cluster so nothing hides behind the new hole.
        let n = self.table_size;
        let mut hole = slot;
        let mut probe = (slot + 1) % n;
        while self.occupied.is_set(probe) {
            let home = self.home(self.entry_at(probe), n);
            if !cyclic_between(hole, home, probe) {
                self.spine[hole] = self.spine[probe];
                self.occupied.set(hole);
                self.spine[probe] = ArenaHandle::default();
                self.occupied.clear(probe);
                hole = probe;
            }
            probe = (probe + 1) % n;
        }

        true
    }

    /// Number of entries.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the set holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current number of spine slots.
    pub fn table_size(&self) -> usize {
        self.table_size
    }

    /// Iterates over stored entries in spine order.
    pub fn entries(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.table_size)
            .filter(|slot| self.occupied.is_set(*slot))
            .map(|slot| self.entry_at(slot))
    }

    /// Returns a snapshot of layout and memory statistics.
    pub fn stats(&self) -> SetStats {
        let n = self.table_size;
        let mut collision_slots = 0u64;
        let mut runs: Vec<u64> = Vec::new();
        let mut current = 0u64;

        for slot in 0..n {
            if self.occupied.is_set(slot) {
                current += 1;
                if self.home(self.entry_at(slot), n) != slot {
                    collision_slots += 1;
                }
            } else if current > 0 {
                runs.push(current);
                current = 0;
            }
        }
        if current > 0 {
            // A run touching the end continues into slot 0.
            if self.occupied.is_set(0) && !runs.is_empty() {
                runs[0] += current;
            } else {
                runs.push(current);
            }
        }

        let mut chain_histogram = ChainHistogram::default();
        for run in &runs {
            chain_histogram.record(*run);
        }
        let total_chain_len: u64 = runs.iter().sum();
        let max_chain_len = runs.iter().copied().max().unwrap_or(0);
        let avg_chain_len = if runs.is_empty() {
            0.0
        } else {
            total_chain_len as f64 / runs.len() as f64
        };

        let spine_bytes = (n * std::mem::size_of::<ArenaHandle>()) as u64;
        let bitmap_bytes = self.occupied.byte_len() as u64;
        let arena = self.arena.stats();

        SetStats {
            spine_len: n as u64,
            spine_use: self.occupied.count_ones(),
            entries: self.len,
            spine_bytes,
            bitmap_bytes,
            collision_slots,
            total_chain_len,
            max_chain_len,
            avg_chain_len,
            chain_histogram,
            resizes: self.resizes,
            arena,
            total_bytes: spine_bytes + bitmap_bytes + arena.allocated_bytes,
        }
    }

    fn validate(entry: &[u8]) -> DedupResult<()> {
        if entry.is_empty() {
            return Err(DedupError::InvalidEntry {
                reason: "empty entry".to_string(),
            });
        }
        match E::stored_len(entry) {
            Some(len) if len == entry.len() => Ok(()),
            Some(len) => Err(DedupError::InvalidEntry {
                reason: format!("entry describes {} bytes but has {}", len, entry.len()),
            }),
            None => Err(DedupError::InvalidEntry {
                reason: "entry is not self-describing".to_string(),
            }),
        }
    }

    #[inline]
    fn home(&self, entry: &[u8], table_size: usize) -> usize {
        (H::hash(entry) % table_size as u64) as usize
    }

    fn entry_at(&self, slot: usize) -> &[u8] {
        let tail = self.arena.tail(self.spine[slot]);
        let len = E::stored_len(tail).unwrap_or(tail.len()).min(tail.len());
        &tail[..len]
    }

    fn find(&self, entry: &[u8]) -> Option<usize> {
        let n = self.table_size;
        let mut slot = self.home(entry, n);
        for _ in 0..n {
            if !self.occupied.is_set(slot) {
                return None;
            }
            if E::equals(self.entry_at(slot), entry) {
                return Some(slot);
            }
            slot = (slot + 1) % n;
        }
        None
    }

    fn maybe_resize(&mut self) {
        let occupancy = 100 * self.len / self.table_size as u64;
        if occupancy > u64::from(self.config.resize_threshold_pct)
            && self.table_size < self.config.max_table_size
        {
            self.resize();
        }
    }

    fn resize(&mut self) {
        let old_size = self.table_size;
        let new_size = old_size
            .saturating_mul(2)
            .min(self.config.max_table_size)
            .max(old_size + 1);

        let mut spine = vec![ArenaHandle::default(); new_size];
        let mut occupied = OccupancyBitmap::new(new_size);

        for slot in 0..old_size {
            if !self.occupied.is_set(slot) {
                continue;
            }
            let home = self.home(self.entry_at(slot), new_size);
            // The new table is strictly larger than the old entry count.
            if let Some(target) = first_free(&occupied, new_size, home) {
                spine[target] = self.spine[slot];
                occupied.set(target);
            }
        }

        self.spine = spine;
        self.occupied = occupied;
        self.table_size = new_size;
        self.resizes += 1;

        debug!(
            old_size,
            new_size,
            entries = self.len,
            "resized fingerprint set"
        );
    }
}

/// First empty slot at or after `start`, wrapping at `table_size`.
fn first_free(occupied: &OccupancyBitmap, table_size: usize, start: usize) -> Option<usize> {
    let mut slot = start;
    for _ in 0..table_size {
        if !occupied.is_set(slot) {
            return Some(slot);
        }
        slot = (slot + 1) % table_size;
    }
    None
}

/// Whether `home` lies in the cyclic range `(hole, probe]`.
#[inline]
fn cyclic_between(hole: usize, home: usize, probe: usize) -> bool {
    if hole <= probe {
        hole < home && home <= probe
    } else {
        home > hole || home <= probe
    }
}
