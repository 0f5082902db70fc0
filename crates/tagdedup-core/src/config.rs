//! Cache configuration, loadable from TOML or JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::arena::ArenaConfig;
use crate::canonical::EncodingLimits;
use crate::error::{DedupError, DedupResult};
use crate::fingerprint_set::TableConfig;

/// Configuration for a `DedupCache`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Tag names excluded from canonicalization in buckets created under this config.
    pub ignored_attributes: Vec<String>,
    /// Fingerprint set sizing for each bucket.
    pub table: TableConfig,
    /// Blob arena chunking for each bucket.
    pub arena: ArenaConfig,
    /// Encoding ceilings.
    pub limits: EncodingLimits,
}

impl CacheConfig {
    /// Loads a config file, choosing the format from its extension (`.toml` or `.json`).
    pub fn from_file(path: &Path) -> DedupResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: CacheConfig = match ext.to_lowercase().as_str() {
            "toml" => {
                toml::from_str(&contents).map_err(|e| DedupError::ConfigParse(e.to_string()))?
            }
            "json" => serde_json::from_str(&contents)
                .map_err(|e| DedupError::ConfigParse(e.to_string()))?,
            _ => {
                return Err(DedupError::ConfigParse(format!(
                    "Unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that sizes are non-zero and mutually consistent.
    pub fn validate(&self) -> DedupResult<()> {
        let table = &self.table;
        if table.initial_table_size < 2 {
            return Err(DedupError::InvalidConfig(
                "table.initial_table_size must be at least 2".to_string(),
            ));
        }
        if table.initial_table_size > table.max_table_size {
            return Err(DedupError::InvalidConfig(format!(
                "table.initial_table_size {} exceeds table.max_table_size {}",
                table.initial_table_size, table.max_table_size
            )));
        }
        if !(1..=99).contains(&table.resize_threshold_pct) {
            return Err(DedupError::InvalidConfig(format!(
                "table.resize_threshold_pct must be within 1..=99, got {}",
                table.resize_threshold_pct
            )));
        }
        if self.arena.initial_chunk_bytes == 0
            || self.arena.initial_chunk_bytes > self.arena.max_chunk_bytes
        {
            return Err(DedupError::InvalidConfig(format!(
                "arena chunk sizes must satisfy 0 < initial ({}) <= max ({})",
                self.arena.initial_chunk_bytes, self.arena.max_chunk_bytes
            )));
        }
        if self.arena.max_chunk_bytes > u32::MAX as usize {
            return Err(DedupError::InvalidConfig(
                "arena.max_chunk_bytes must fit in 32 bits".to_string(),
            ));
        }
        if self.limits.max_entry_bytes == 0 || self.limits.max_attributes == 0 {
            return Err(DedupError::InvalidConfig(
                "limits must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = CacheConfig::default();
        assert!(config.ignored_attributes.is_empty());
        assert_eq!(config.table.initial_table_size, 4096);
        assert_eq!(config.table.max_table_size, 512 << 20);
        assert_eq!(config.table.resize_threshold_pct, 70);
        assert_eq!(config.limits.max_entry_bytes, 16384);
        assert_eq!(config.limits.max_attributes, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
ignored_attributes = ["time", "value"]

[table]
initial_table_size = 64
max_table_size = 1024
"#
        )
        .unwrap();

        let config = CacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ignored_attributes, vec!["time", "value"]);
        assert_eq!(config.table.initial_table_size, 64);
        assert_eq!(config.table.max_table_size, 1024);
        assert_eq!(config.table.resize_threshold_pct, 70);
        assert_eq!(config.limits, EncodingLimits::default());
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{"ignored_attributes": ["time"], "limits": {{"max_attributes": 10}}}}"#
        )
        .unwrap();

        let config = CacheConfig::from_file(file.path()).unwrap();
        assert_eq!(config.ignored_attributes, vec!["time"]);
        assert_eq!(config.limits.max_attributes, 10);
        assert_eq!(config.limits.max_entry_bytes, 16384);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        let err = CacheConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, DedupError::ConfigParse(_)));
    }

    #[test]
    fn test_invalid_file_rejected_by_validation() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[table]\ninitial_table_size = 8192\nmax_table_size = 4096").unwrap();
        let err = CacheConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, DedupError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_threshold_range() {
        let mut config = CacheConfig::default();
        config.table.resize_threshold_pct = 100;
        assert!(config.validate().is_err());
        config.table.resize_threshold_pct = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_arena_sizes() {
        let mut config = CacheConfig::default();
        config.arena.initial_chunk_bytes = 0;
        assert!(config.validate().is_err());
        config.arena.initial_chunk_bytes = config.arena.max_chunk_bytes + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut config = CacheConfig::default();
        config.ignored_attributes = vec!["time".to_string()];
        config.table.initial_table_size = 128;
        let json = serde_json::to_string(&config).unwrap();
        let decoded: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, decoded);
    }
}
