use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tagdedup_core::CacheConfig;

/// Command line of the `tagdedup` binary.
#[derive(Parser)]
#[command(name = "tagdedup")]
#[command(about = "Attribute-set dedup cache for tagged time-series points", long_about = None)]
pub struct Cli {
    /// Cache configuration file (`.toml` or `.json`).
    #[arg(short, long, global = true, env = "TAGDEDUP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Answer JSON-lines requests from stdin or a file.
    Serve {
        /// Read requests from this file instead of stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Insert every combination of generated attribute values and report stats.
    Bench {
        /// Attributes per point.
        #[arg(long, default_value = "3")]
        num_keys: u32,
        /// Distinct values per attribute.
        #[arg(long, default_value = "10")]
        values_per_key: u64,
        /// Bucket to insert into.
        #[arg(long, default_value = "bench")]
        bucket: String,
    },
}

impl Cli {
    /// Loads the cache configuration, falling back to defaults when no file is usable.
    pub fn load_config(&self) -> Result<CacheConfig> {
        match &self.config {
            Some(path) if path.exists() => Ok(CacheConfig::from_file(path)?),
            Some(path) => {
                tracing::warn!("Config file not found, using defaults: {}", path.display());
                Ok(CacheConfig::default())
            }
            None => Ok(CacheConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_serve_with_input() {
        let cli = Cli::try_parse_from(["tagdedup", "serve", "--input", "req.jsonl"]).unwrap();
        match cli.command {
            Command::Serve { input } => assert_eq!(input, Some(PathBuf::from("req.jsonl"))),
            Command::Bench { .. } => panic!("expected serve"),
        }
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_bench_defaults() {
        let cli = Cli::try_parse_from(["tagdedup", "bench"]).unwrap();
        match cli.command {
            Command::Bench {
                num_keys,
                values_per_key,
                bucket,
            } => {
                assert_eq!(num_keys, 3);
                assert_eq!(values_per_key, 10);
                assert_eq!(bucket, "bench");
            }
            Command::Serve { .. } => panic!("expected bench"),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "ignored_attributes = [\"time\"]").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = Cli::try_parse_from(["tagdedup", "serve", "--config", path.as_str()]).unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.ignored_attributes, vec!["time".to_string()]);
    }

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let cli =
            Cli::try_parse_from(["tagdedup", "--config", "/nonexistent/tagdedup.toml", "bench"])
                .unwrap();
        assert_eq!(cli.load_config().unwrap(), CacheConfig::default());
    }
}
