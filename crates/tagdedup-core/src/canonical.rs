//! Attribute-set canonicalization.
//!
//! A point's non-ignored (tag, value) pairs are interned, sorted by `(tag_id, value_id)` and
//! packed as `varint(count) · varint(tag_id₁) · varint(value_id₁) · …`. Ids depend only on the
//! strings, never on the order a point supplies them, so any two points carrying the same
//! attribute pairs encode to identical bytes. Those bytes are the dedup identity.
//!
//! The optional display form renders the same sorted sequence as `tag=value` segments joined
//! by `,`. It is informational and never used for equality.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use xxhash_rust::xxh3::xxh3_64;

use crate::error::{DedupError, DedupResult};
use crate::fingerprint_set::{EntryEquals, EntryHash};
use crate::point::Point;
use crate::string_table::{StringId, StringTable};
use crate::varint::{decode_varint, encode_varint, encoded_len};

/// Size ceilings for one canonical encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingLimits {
    /// Ceiling for both the binary entry and the display string, in bytes (default 16KB).
    pub max_entry_bytes: usize,
    /// Ceiling on non-ignored attributes per point (default 100).
    pub max_attributes: usize,
}

impl Default for EncodingLimits {
    fn default() -> Self {
        Self {
            max_entry_bytes: 16 << 10,
            max_attributes: 100,
        }
    }
}

/// Tag names excluded from canonicalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    tags: HashSet<String>,
}

impl IgnoreList {
    /// Builds an ignore-list from tag names.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `tag` is ignored.
    #[inline]
    pub fn contains(&self, tag: &str) -> bool {
        !self.tags.is_empty() && self.tags.contains(tag)
    }

    /// Number of ignored tag names.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether nothing is ignored.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Ignored tag names, sorted.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.iter().cloned().collect();
        tags.sort();
        tags
    }
}

/// A resolved attribute pair plus the text needed for the display form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeToken<'a> {
    /// Interned tag id.
    pub tag_id: StringId,
    /// Interned value id.
    pub value_id: StringId,
    /// Tag text.
    pub tag: &'a str,
    /// Value text.
    pub value: &'a str,
}

/// The canonical encoding of one point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEntry {
    /// Packed binary entry; the dedup identity.
    pub bytes: Vec<u8>,
    /// `tag=value,...` rendering, when requested.
    pub display: Option<String>,
}

/// Turns points into canonical entries under one ignore-list and set of limits.
#[derive(Debug, Clone)]
pub struct CanonicalEncoder {
    limits: EncodingLimits,
    ignored: Arc<IgnoreList>,
}

impl CanonicalEncoder {
    /// Creates an encoder.
    pub fn new(limits: EncodingLimits, ignored: Arc<IgnoreList>) -> Self {
        Self { limits, ignored }
    }

    /// The ignore-list this encoder applies.
    pub fn ignored(&self) -> &IgnoreList {
        &self.ignored
    }

    /// Canonicalizes `point`, interning its strings into `strings`.
    ///
    /// `TooManyAttributes` is reported before anything is interned. `EntryTooLarge` is
    /// reported after interning, which is not rolled back: interning is idempotent and the
    /// table is shared, so the extra strings are not a leak. The display length is checked
    /// even when `want_display` is false, so whether a point is admissible never depends on
    /// the flag.
    pub fn encode<P>(
        &self,
        strings: &mut StringTable,
        point: &P,
        want_display: bool,
    ) -> DedupResult<CanonicalEntry>
    where
        P: Point + ?Sized,
    {
        let count = point
            .attributes()
            .filter(|(tag, _)| !self.ignored.contains(tag))
            .count();
        if count > self.limits.max_attributes {
            warn!(
                count,
                limit = self.limits.max_attributes,
                "rejecting point with too many attributes"
            );
            return Err(DedupError::TooManyAttributes {
                count,
                limit: self.limits.max_attributes,
            });
        }

        let mut tokens: Vec<AttributeToken<'_>> = Vec::with_capacity(count);
        for (tag, value) in point.attributes() {
            if self.ignored.contains(tag) {
                continue;
            }
            let pair = strings.intern_attribute(tag, value);
            tokens.push(AttributeToken {
                tag_id: pair.tag_id,
                value_id: pair.value_id,
                tag,
                value,
            });
        }
        tokens.sort_unstable_by_key(|t| (t.tag_id, t.value_id));

        let display_len = display_len(&tokens);
        if display_len > self.limits.max_entry_bytes {
            warn!(
                size = display_len,
                limit = self.limits.max_entry_bytes,
                "rejecting point whose display form is too large"
            );
            return Err(DedupError::EntryTooLarge {
                size: display_len,
                limit: self.limits.max_entry_bytes,
            });
        }

        let bytes = encode_tokens(&tokens);
        if bytes.len() > self.limits.max_entry_bytes {
            warn!(
                size = bytes.len(),
                limit = self.limits.max_entry_bytes,
                "rejecting point whose entry is too large"
            );
            return Err(DedupError::EntryTooLarge {
                size: bytes.len(),
                limit: self.limits.max_entry_bytes,
            });
        }

        let display = want_display.then(|| render(&tokens, display_len));
        Ok(CanonicalEntry { bytes, display })
    }
}

/// Packs sorted tokens into the binary entry format.
pub fn encode_tokens(tokens: &[AttributeToken<'_>]) -> Vec<u8> {
    let size = encoded_len(tokens.len() as u64)
        + tokens
            .iter()
            .map(|t| encoded_len(t.tag_id.get()) + encoded_len(t.value_id.get()))
            .sum::<usize>();
    let mut buf = Vec::with_capacity(size);
    encode_varint(tokens.len() as u64, &mut buf);
    for token in tokens {
        encode_varint(token.tag_id.get(), &mut buf);
        encode_varint(token.value_id.get(), &mut buf);
    }
    buf
}

fn display_len(tokens: &[AttributeToken<'_>]) -> usize {
    let pairs: usize = tokens.iter().map(|t| t.tag.len() + 1 + t.value.len()).sum();
    pairs + tokens.len().saturating_sub(1)
}

fn render(tokens: &[AttributeToken<'_>], capacity: usize) -> String {
    let mut out = String::with_capacity(capacity);
    for (i, token) in tokens.iter().enumerate() {
        if i != 0 {
            out.push(',');
        }
        out.push_str(token.tag);
        out.push('=');
        out.push_str(token.value);
    }
    out
}

/// Length of the canonical entry at the start of `bytes`, recovered from its token count.
pub fn entry_len(bytes: &[u8]) -> DedupResult<usize> {
    let mut pos = 0;
    let count = decode_varint(bytes, &mut pos)?;
    for _ in 0..count {
        decode_varint(bytes, &mut pos)?;
        decode_varint(bytes, &mut pos)?;
    }
    Ok(pos)
}

/// Decodes a complete canonical entry into its `(tag_id, value_id)` pairs.
pub fn decode_entry(bytes: &[u8]) -> DedupResult<Vec<(StringId, StringId)>> {
    let mut pos = 0;
    let count = decode_varint(bytes, &mut pos)?;
    let mut pairs = Vec::new();
    for _ in 0..count {
        let tag = decode_id(bytes, &mut pos)?;
        let value = decode_id(bytes, &mut pos)?;
        pairs.push((tag, value));
    }
    if pos != bytes.len() {
        return Err(DedupError::InvalidEntry {
            reason: format!("{} trailing bytes after entry", bytes.len() - pos),
        });
    }
    Ok(pairs)
}

fn decode_id(bytes: &[u8], pos: &mut usize) -> DedupResult<StringId> {
    let raw = decode_varint(bytes, pos)?;
    StringId::new(raw).ok_or_else(|| DedupError::InvalidEntry {
        reason: "string id 0 in entry".to_string(),
    })
}

/// xxh3 hash policy for canonical entries.
pub struct CanonicalHash;

impl EntryHash for CanonicalHash {
    #[inline]
    fn hash(entry: &[u8]) -> u64 {
        xxh3_64(entry)
    }
}

/// Byte-equality policy for canonical entries, with length recovered from the token count.
pub struct CanonicalEquals;

impl EntryEquals for CanonicalEquals {
    #[inline]
    fn stored_len(stored: &[u8]) -> Option<usize> {
        entry_len(stored).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encoder(ignored: &[&str]) -> CanonicalEncoder {
        CanonicalEncoder::new(
            EncodingLimits::default(),
            Arc::new(IgnoreList::new(ignored.iter().copied())),
        )
    }

    #[test]
    fn test_entry_layout_for_small_ids() {
        let mut strings = StringTable::new();
        let point = [("name", "cpu.system"), ("pop", "SF")];
        let entry = encoder(&[]).encode(&mut strings, &point, false).unwrap();
        // name=1, cpu.system=2, pop=3, SF=4.
        assert_eq!(entry.bytes, vec![2, 1, 2, 3, 4]);
        assert_eq!(entry.display, None);
    }

    #[test]
    fn test_display_follows_id_order() {
        let mut strings = StringTable::new();
        let enc = encoder(&[]);
        enc.encode(&mut strings, &[("zone", "a")], false).unwrap();
        let entry = enc
            .encode(&mut strings, &[("alpha", "1"), ("zone", "a")], true)
            .unwrap();
        // "zone" was interned first, so it sorts first.
        assert_eq!(entry.display.as_deref(), Some("zone=a,alpha=1"));
    }

    #[test]
    fn test_order_independence() {
        let mut strings = StringTable::new();
        let enc = encoder(&[]);
        let a = enc
            .encode(&mut strings, &[("host", "h1"), ("pop", "SF"), ("dc", "x")], true)
            .unwrap();
        let b = enc
            .encode(&mut strings, &[("dc", "x"), ("host", "h1"), ("pop", "SF")], true)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ignored_tags_are_skipped() {
        let mut strings = StringTable::new();
        let enc = encoder(&["time"]);
        let with_time = enc
            .encode(&mut strings, &[("host", "h"), ("time", "123")], true)
            .unwrap();
        let without = enc.encode(&mut strings, &[("host", "h")], true).unwrap();
        assert_eq!(with_time, without);
        assert_eq!(with_time.display.as_deref(), Some("host=h"));
        assert!(!strings.was_known("time"));
    }

    #[test]
    fn test_empty_point_encodes_to_zero_count() {
        let mut strings = StringTable::new();
        let empty: [(&str, &str); 0] = [];
        let entry = encoder(&[]).encode(&mut strings, &empty, true).unwrap();
        assert_eq!(entry.bytes, vec![0]);
        assert_eq!(entry.display.as_deref(), Some(""));
    }

    #[test]
    fn test_too_many_attributes_interns_nothing() {
        let mut strings = StringTable::new();
        let point: Vec<(String, String)> = (0..101)
            .map(|i| (format!("k{}", i), "v".to_string()))
            .collect();
        let err = encoder(&[]).encode(&mut strings, &point, false).unwrap_err();
        assert!(matches!(
            err,
            DedupError::TooManyAttributes {
                count: 101,
                limit: 100
            }
        ));
        assert!(strings.is_empty());
    }

    #[test]
    fn test_ignored_tags_do_not_count_toward_limit() {
        let mut strings = StringTable::new();
        let mut point: Vec<(String, String)> = (0..100)
            .map(|i| (format!("k{}", i), "v".to_string()))
            .collect();
        point.push(("time".to_string(), "now".to_string()));
        assert!(encoder(&["time"]).encode(&mut strings, &point, false).is_ok());
    }

    #[test]
    fn test_oversized_display_rejected_without_flag() {
        let mut strings = StringTable::new();
        let long = "v".repeat(9000);
        let point = [("a", long.as_str()), ("b", long.as_str())];
        let err = encoder(&[]).encode(&mut strings, &point, false).unwrap_err();
        assert!(matches!(err, DedupError::EntryTooLarge { limit: 16384, .. }));
        // Interning is not rolled back.
        assert!(strings.was_known("a"));
    }

    #[test]
    fn test_display_exactly_at_limit_is_accepted() {
        let mut strings = StringTable::new();
        let value = "v".repeat(16384 - 2);
        let point = [("a", value.as_str())];
        let entry = encoder(&[]).encode(&mut strings, &point, true).unwrap();
        assert_eq!(entry.display.map(|d| d.len()), Some(16384));
    }

    #[test]
    fn test_entry_len_and_decode() {
        let mut strings = StringTable::new();
        let entry = encoder(&[])
            .encode(&mut strings, &[("a", "b"), ("c", "d")], false)
            .unwrap();
        let mut padded = entry.bytes.clone();
        padded.extend_from_slice(&[9, 9, 9]);
        assert_eq!(entry_len(&padded).unwrap(), entry.bytes.len());

        let pairs = decode_entry(&entry.bytes).unwrap();
        let resolved: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(t, v)| (strings.resolve(*t).unwrap(), strings.resolve(*v).unwrap()))
            .collect();
        assert_eq!(resolved, vec![("a", "b"), ("c", "d")]);
        assert!(decode_entry(&padded).is_err());
    }

    #[test]
    fn test_decode_rejects_malformed_ids() {
        let mut overlong = vec![1u8];
        overlong.extend_from_slice(&[0x80; 9]);
        overlong.extend_from_slice(&[0x81, 0x00, 0x01]);
        assert!(matches!(
            decode_entry(&overlong),
            Err(DedupError::InvalidEntry { .. })
        ));
        assert!(decode_entry(&[1, 0x81, 0x00, 0x01]).is_err());
        assert!(decode_entry(&[1, 0, 1]).is_err());
        assert_eq!(CanonicalEquals::stored_len(&[1, 0x81, 0x00, 0x01]), None);
    }

    #[test]
    fn test_equals_policy_recovers_length() {
        assert_eq!(CanonicalEquals::stored_len(&[1, 5, 6, 0xAA]), Some(3));
        assert_eq!(CanonicalEquals::stored_len(&[2, 5, 6]), None);
        assert_eq!(CanonicalEquals::stored_len(&[0]), Some(1));
    }

    proptest! {
        #[test]
        fn prop_permutation_yields_identical_entry(
            pairs in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..20),
            seed in any::<u64>(),
        ) {
            let mut strings = StringTable::new();
            let enc = encoder(&[]);
            let ordered: Vec<(String, String)> = pairs.into_iter().collect();
            let mut shuffled = ordered.clone();
            // Deterministic rotation plus reversal stands in for an arbitrary permutation.
            if !shuffled.is_empty() {
                let k = (seed as usize) % shuffled.len();
                shuffled.rotate_left(k);
                if seed & 1 == 1 {
                    shuffled.reverse();
                }
            }
            let a = enc.encode(&mut strings, &ordered, true).unwrap();
            let b = enc.encode(&mut strings, &shuffled, true).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
