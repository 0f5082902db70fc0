#![warn(missing_docs)]

//! `tagdedup`: line-delimited JSON front end and load generator for the dedup cache.

mod bench;
mod cli;
mod protocol;

use std::fs::File;
use std::io::{self, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use protocol::Session;
use tagdedup_core::DedupCache;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // stdout carries protocol replies, so logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let mut cache = DedupCache::new(config)?;

    match &cli.command {
        Command::Serve { input } => {
            tracing::info!("tagdedup serving requests");
            let mut session = Session::new(cache);
            let stdout = io::stdout().lock();
            match input {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("opening {}", path.display()))?;
                    session.run(BufReader::new(file), stdout)
                }
                None => session.run(io::stdin().lock(), stdout),
            }
        }
        Command::Bench {
            num_keys,
            values_per_key,
            bucket,
        } => {
            let stats = bench::run(&mut cache, bucket, *num_keys, *values_per_key)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}
