//! Bulk-loads `hash_records` with random hashes for `pg-benchmark`.
//!
//! Usage:
//!   cargo run --release --bin pg-seed
//!   HASHBENCH_TOTAL_RECORDS=1_000_000 cargo run --release --bin pg-seed

use anyhow::Result;
use bench_core::config;
use hashbench::backend::postgres::PgSink;
use hashbench::loader::{BatchLoader, BatchSink, LoadConfig};
use hashbench::report;
use log::warn;

#[tokio::main]
async fn main() -> Result<()> {
    hashbench::init_process()?;

    let load_config = LoadConfig::new(
        config::resolve_total_records(),
        config::resolve_pg_batch_size(),
    );
    report::print_load_plan(
        load_config.target,
        load_config.batch_size,
        "hash_btree (B-tree), hash_hash (Hash), hash_noindex (none)",
    );

    let mut loader = BatchLoader::new(load_config)?;
    let mut sink = PgSink::connect(&config::resolve_database_url()).await?;

    let outcome = loader.run(&mut sink, report::print_progress).await;

    if let Err(err) = sink.disconnect().await {
        warn!("Closing connection failed: {err:#}");
    }

    let load = outcome?;
    report::print_load_summary(&load);
    load.into_result()
}
