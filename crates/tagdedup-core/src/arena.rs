//! Append-only blob arena backing fingerprint set entries.
//!
//! Bytes are copied into chunked storage and addressed by an `ArenaHandle` that stays valid
//! for the arena's lifetime. Chunks grow geometrically (doubling) from `initial_chunk_bytes`
//! up to `max_chunk_bytes`. There is no per-entry free: storage is reclaimed only when the
//! arena itself is dropped.
//!
//! The arena stores no per-entry length. Entries are expected to be self-describing, so a
//! reader recovers an entry's extent from the bytes starting at its handle (see `tail`).

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Configuration for the blob arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Capacity of the first chunk in bytes (default 64KB).
    pub initial_chunk_bytes: usize,
    /// Capacity cap for geometrically grown chunks in bytes (default 20MB).
    pub max_chunk_bytes: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            initial_chunk_bytes: 64 * 1024,
            max_chunk_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Stable address of an entry stored in a `BlobArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ArenaHandle {
    /// Index of the chunk holding the entry.
    pub chunk: u32,
    /// Byte offset of the entry within its chunk.
    pub offset: u32,
}

/// Arena memory statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaStats {
    /// Number of chunks allocated.
    pub chunks: u64,
    /// Bytes reserved across all chunks.
    pub allocated_bytes: u64,
    /// Bytes holding entry content.
    pub used_bytes: u64,
}

impl ArenaStats {
    /// Reserved bytes not holding entry content.
    pub fn slack_bytes(&self) -> u64 {
        self.allocated_bytes.saturating_sub(self.used_bytes)
    }
}

/// Append-only chunked byte store.
#[derive(Debug)]
pub struct BlobArena {
    config: ArenaConfig,
    chunks: Vec<Vec<u8>>,
    /// Capacity requested for each chunk, parallel to `chunks`.
    capacities: Vec<usize>,
    used_bytes: u64,
}

impl Default for BlobArena {
    fn default() -> Self {
        Self::with_config(ArenaConfig::default())
    }
}

impl BlobArena {
    /// Creates an empty arena. No memory is reserved until the first append.
    pub fn with_config(config: ArenaConfig) -> Self {
        Self {
            config,
            chunks: Vec::new(),
            capacities: Vec::new(),
            used_bytes: 0,
        }
    }

    /// Copies `bytes` into the arena and returns a handle to them.
    pub fn append(&mut self, bytes: &[u8]) -> ArenaHandle {
        let fits = match (self.chunks.last(), self.capacities.last()) {
            (Some(chunk), Some(&capacity)) => capacity - chunk.len() >= bytes.len(),
            _ => false,
        };
        if !fits {
            self.grow(bytes.len());
        }

        let chunk_idx = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_idx];
        let offset = chunk.len();
        chunk.extend_from_slice(bytes);
        self.used_bytes += bytes.len() as u64;

        ArenaHandle {
            chunk: chunk_idx as u32,
            offset: offset as u32,
        }
    }

    /// Returns the bytes from `handle` to the end of its chunk's written content.
    ///
    /// The entry at `handle` is a prefix of the returned slice.
    pub fn tail(&self, handle: ArenaHandle) -> &[u8] {
        self.chunks
            .get(handle.chunk as usize)
            .and_then(|chunk| chunk.get(handle.offset as usize..))
            .unwrap_or(&[])
    }

    /// Returns memory statistics.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            chunks: self.chunks.len() as u64,
            allocated_bytes: self.capacities.iter().map(|c| *c as u64).sum(),
            used_bytes: self.used_bytes,
        }
    }

    fn grow(&mut self, min_bytes: usize) {
        let max = self.config.max_chunk_bytes;
        let mut geometric = self.config.initial_chunk_bytes;
        for _ in 0..self.chunks.len() {
            if geometric >= max {
                break;
            }
            geometric = geometric.saturating_mul(2);
        }
        let capacity = geometric.min(max).max(min_bytes);

        trace!(
            chunk = self.chunks.len(),
            capacity,
            "allocating arena chunk"
        );
        self.chunks.push(Vec::with_capacity(capacity));
        self.capacities.push(capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_arena() -> BlobArena {
        BlobArena::with_config(ArenaConfig {
            initial_chunk_bytes: 16,
            max_chunk_bytes: 64,
        })
    }

    #[test]
    fn test_empty_arena_reserves_nothing() {
        let arena = BlobArena::default();
        assert_eq!(arena.stats(), ArenaStats::default());
    }

    #[test]
    fn test_append_and_read_back() {
        let mut arena = small_arena();
        let a = arena.append(b"abc");
        let b = arena.append(b"defg");
        assert_eq!(&arena.tail(a)[..3], b"abc");
        assert_eq!(arena.tail(b), b"defg");
        assert_eq!(arena.tail(a), b"abcdefg");
        assert_eq!(arena.stats().used_bytes, 7);
    }

    #[test]
    fn test_chunks_grow_geometrically_up_to_cap() {
        let mut arena = small_arena();
        for _ in 0..20 {
            arena.append(&[7u8; 10]);
        }
        let caps = arena.capacities.clone();
        assert_eq!(&caps[..4], &[16, 32, 64, 64]);
        assert!(caps.iter().all(|c| *c <= 64));
        let stats = arena.stats();
        assert_eq!(stats.used_bytes, 200);
        assert_eq!(stats.allocated_bytes, caps.iter().map(|c| *c as u64).sum::<u64>());
        assert!(stats.slack_bytes() < stats.allocated_bytes);
    }

    #[test]
    fn test_oversized_entry_gets_dedicated_chunk() {
        let mut arena = small_arena();
        arena.append(b"x");
        let big = vec![1u8; 100];
        let handle = arena.append(&big);
        assert_eq!(handle.offset, 0);
        assert_eq!(arena.tail(handle), &big[..]);
        assert_eq!(arena.capacities[handle.chunk as usize], 100);
    }

    #[test]
    fn test_handles_stay_valid_across_growth() {
        let mut arena = small_arena();
        let handles: Vec<_> = (0u8..50).map(|i| arena.append(&[i, i, i])).collect();
        for (i, handle) in handles.iter().enumerate() {
            let i = i as u8;
            assert_eq!(&arena.tail(*handle)[..3], &[i, i, i][..]);
        }
    }

    #[test]
    fn test_unknown_handle_reads_empty() {
        let arena = small_arena();
        let bogus = ArenaHandle {
            chunk: 3,
            offset: 0,
        };
        assert!(arena.tail(bogus).is_empty());
    }
}
