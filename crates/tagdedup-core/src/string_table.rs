//! String interning for attribute tags and values.
//!
//! Every distinct string seen by a cache is assigned a small, stable, strictly positive id
//! the first time it is interned. Ids are handed out in sequence starting at 1 and are never
//! reused or renumbered. The table is append-only for its whole lifetime: dropping every
//! bucket that referenced a string does not reclaim it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::num::NonZeroU64;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

/// Stable id of an interned string. Always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StringId(NonZeroU64);

impl StringId {
    /// Returns the raw id value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Builds an id from a raw value, returning `None` for zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    fn from_index(index: usize) -> Self {
        // index + 1 is never zero.
        Self(NonZeroU64::MIN.saturating_add(index as u64))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of interning one (tag, value) attribute pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternedPair {
    /// Id of the tag name.
    pub tag_id: StringId,
    /// Id of the tag value.
    pub value_id: StringId,
    /// Both strings existed before this call.
    ///
    /// This says nothing about whether an entry holding this pair exists anywhere.
    pub known: bool,
}

/// Snapshot of string table statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringTableStats {
    /// Number of distinct interned strings.
    pub strings: u64,
    /// Total bytes of interned string content.
    pub bytes: u64,
    /// Number of distinct tag names seen in attribute pairs.
    pub num_tags: u64,
    /// Per tag name, the number of distinct values seen with it.
    pub tag_values: BTreeMap<String, u64>,
    /// Attribute pairs interned.
    pub lookups: u64,
    /// Attribute pairs whose tag and value were both already interned.
    pub fully_known_lookups: u64,
}

/// Append-only string interner shared by every bucket of one cache.
#[derive(Debug, Default)]
pub struct StringTable {
    /// Concatenated content of every interned string.
    bytes: String,
    /// Byte range in `bytes` of each string; index `i` holds id `i + 1`.
    spans: Vec<Range<usize>>,
    /// xxh3 of content -> ids carrying that hash.
    lookup: HashMap<u64, Vec<StringId>>,
    /// Tag id -> distinct value ids seen with it.
    tag_values: HashMap<StringId, HashSet<StringId>>,
    lookups: u64,
    fully_known_lookups: u64,
}

impl StringTable {
    /// Creates an empty string table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `text`, assigning the next id if it has never been seen.
    pub fn intern(&mut self, text: &str) -> StringId {
        self.intern_with_status(text).0
    }

    /// Like `intern`, also reporting whether `text` was already known before this call.
    pub fn intern_with_status(&mut self, text: &str) -> (StringId, bool) {
        let hash = xxh3_64(text.as_bytes());
        if let Some(id) = self.find(hash, text) {
            return (id, true);
        }

        let start = self.bytes.len();
        self.bytes.push_str(text);
        let id = StringId::from_index(self.spans.len());
        self.spans.push(start..self.bytes.len());
        self.lookup.entry(hash).or_default().push(id);

        trace!(id = id.get(), len = text.len(), "interned new string");
        (id, false)
    }

    /// Interns a (tag, value) attribute pair and records the value under its tag.
    pub fn intern_attribute(&mut self, tag: &str, value: &str) -> InternedPair {
        let (tag_id, tag_known) = self.intern_with_status(tag);
        let (value_id, value_known) = self.intern_with_status(value);

        self.tag_values.entry(tag_id).or_default().insert(value_id);

        let known = tag_known && value_known;
        self.lookups += 1;
        if known {
            self.fully_known_lookups += 1;
        }

        InternedPair {
            tag_id,
            value_id,
            known,
        }
    }

    /// Returns the id of `text` without interning it.
    pub fn get(&self, text: &str) -> Option<StringId> {
        self.find(xxh3_64(text.as_bytes()), text)
    }

    /// Whether `text` has been interned.
    pub fn was_known(&self, text: &str) -> bool {
        self.get(text).is_some()
    }

    /// Resolves an id back to its string.
    pub fn resolve(&self, id: StringId) -> Option<&str> {
        let span = self.spans.get(id.index())?;
        self.bytes.get(span.clone())
    }

    /// Number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Returns a snapshot of the table statistics.
    pub fn stats(&self) -> StringTableStats {
        let tag_values = self
            .tag_values
            .iter()
            .filter_map(|(tag, values)| {
                self.resolve(*tag)
                    .map(|name| (name.to_string(), values.len() as u64))
            })
            .collect();

        StringTableStats {
            strings: self.spans.len() as u64,
            bytes: self.bytes.len() as u64,
            num_tags: self.tag_values.len() as u64,
            tag_values,
            lookups: self.lookups,
            fully_known_lookups: self.fully_known_lookups,
        }
    }

    fn find(&self, hash: u64, text: &str) -> Option<StringId> {
        self.lookup
            .get(&hash)?
            .iter()
            .copied()
            .find(|id| self.resolve(*id) == Some(text))
    }
}
