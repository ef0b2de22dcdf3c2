// Copyright (C) 2026 Fred Clausen
// Use of this source code is governed by an MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT.

#![deny(
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    clippy::style,
    clippy::correctness,
    clippy::all,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::multiple_crate_versions)]

mod jobs;

use affilink::{AffiliateEngine, Clock, DEFAULT_PAGE_SIZE, SystemClock};
use affilink_persistence::SqliteStore;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::jobs::Jobs;

/// Affilink worker - runs the scheduled commission jobs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the `SQLite` database file. If not provided, uses in-memory database.
    #[arg(short, long)]
    database: Option<String>,

    /// Seconds between cycles
    #[arg(short, long, default_value_t = 3_600)]
    interval_secs: u64,

    /// Commissions fetched per reconciliation page
    #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Initializing affilink worker");

    let store: SqliteStore = if let Some(db_path) = &args.database {
        info!("Using file-based database at: {}", db_path);
        SqliteStore::new_with_file(db_path)?
    } else {
        info!("Using in-memory database");
        SqliteStore::new_in_memory()?
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine: AffiliateEngine<SqliteStore> = AffiliateEngine::new(Arc::new(store), clock);
    let jobs: Jobs<'_, SqliteStore> = Jobs::new(&engine, args.page_size);

    if args.once {
        jobs.run_cycle();
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(args.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(interval_secs = args.interval_secs, "Worker started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                jobs.run_cycle();
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_args_defaults() {
        let args: Args = Args::try_parse_from(["affilink-worker"]).unwrap();

        assert_eq!(args.database, None);
        assert_eq!(args.interval_secs, 3_600);
        assert_eq!(args.page_size, DEFAULT_PAGE_SIZE);
        assert!(!args.once);
    }

    #[test]
    fn test_args_single_cycle_against_file() {
        let args: Args = Args::try_parse_from([
            "affilink-worker",
            "--database",
            "affilink.db",
            "--page-size",
            "50",
            "--once",
        ])
        .unwrap();

        assert_eq!(args.database.as_deref(), Some("affilink.db"));
        assert_eq!(args.page_size, 50);
        assert!(args.once);
    }
}
