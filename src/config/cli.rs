//! Command-line interface

use super::Config;
use crate::types::{RootPair, SyncError};
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Keep pairs of directory trees mirrored in both directions
#[derive(Debug, Parser)]
#[command(name = "twinsync", version, about)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Root pair to mirror, may be repeated
    #[arg(short, long = "pair", value_name = "LEFT=RIGHT", value_parser = parse_pair)]
    pub pairs: Vec<RootPair>,

    /// Quiet interval before applying a change, in milliseconds
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Number of worker threads
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Only watch the roots themselves
    #[arg(long)]
    pub no_recursive: bool,

    /// Exclude entries matching this glob, may be repeated
    #[arg(short, long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Parse `LEFT=RIGHT` into a root pair
pub fn parse_pair(value: &str) -> Result<RootPair, String> {
    match value.split_once('=') {
        Some((left, right)) if !left.is_empty() && !right.is_empty() => {
            Ok(RootPair::new(left, right))
        }
        _ => Err(format!("expected LEFT=RIGHT, got '{}'", value)),
    }
}

impl TryFrom<Cli> for Config {
    type Error = SyncError;

    /// File values first, then CLI overrides; the result is validated.
    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let mut config = match &cli.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        config.pairs.extend(cli.pairs);
        if let Some(debounce_ms) = cli.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        if let Some(workers) = cli.workers {
            config.workers = workers;
        }
        if cli.no_recursive {
            config.recursive = false;
        }
        config.exclude.extend(cli.exclude);

        config.validate()?;
        Ok(config)
    }
}
