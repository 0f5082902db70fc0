//! Synthetic load: every combination of `values_per_key` values over `num_keys` tags.

use std::time::Instant;

use anyhow::{bail, Result};
use tagdedup_core::{CacheStats, DedupCache};
use tracing::info;

/// Number of points a run will generate, or `None` if it overflows.
pub fn point_count(num_keys: u32, values_per_key: u64) -> Option<u64> {
    values_per_key.checked_pow(num_keys)
}

/// Attributes of the `index`-th generated point: `key{j}` takes digit `j` of `index` in base
/// `values_per_key`.
pub fn generated_point(index: u64, num_keys: u32, values_per_key: u64) -> Vec<(String, String)> {
    let mut rest = index;
    (0..num_keys)
        .map(|j| {
            let digit = rest % values_per_key;
            rest /= values_per_key;
            (format!("key{}", j), format!("value{}", digit))
        })
        .collect()
}

/// Inserts every generated point into `bucket`, logging progress each percent.
pub fn run(
    cache: &mut DedupCache,
    bucket: &str,
    num_keys: u32,
    values_per_key: u64,
) -> Result<CacheStats> {
    if num_keys == 0 || values_per_key == 0 {
        bail!("num_keys and values_per_key must both be positive");
    }
    let Some(total) = point_count(num_keys, values_per_key) else {
        bail!(
            "{} values over {} keys overflows the point count",
            values_per_key,
            num_keys
        );
    };

    let step = (total / 100).max(1);
    let start = Instant::now();
    info!(total, num_keys, values_per_key, bucket, "starting bench");

    for i in 0..total {
        if i % step == 0 {
            let set = cache.bucket(bucket).map(|b| b.stats().set).unwrap_or_default();
            info!(
                stored = i,
                elapsed_ms = start.elapsed().as_millis() as u64,
                spine_len = set.spine_len,
                total_bytes = set.total_bytes,
                arena_slack_bytes = set.arena.slack_bytes(),
                "bench progress"
            );
        }
        let point = generated_point(i, num_keys, values_per_key);
        cache.add(bucket, &point, false)?;
    }

    info!(
        stored = total,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "bench finished"
    );
    Ok(cache.stats())
}
