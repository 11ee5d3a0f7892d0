//! Bulk-indexes random hashes into OpenSearch for `search-benchmark`.
//!
//! Usage:
//!   cargo run --release --bin search-seed
//!   OPENSEARCH_URL=http://search:9200 cargo run --release --bin search-seed

use anyhow::Result;
use bench_core::config;
use bench_core::constants::SEARCH_INDEX;
use hashbench::backend::search::SearchSink;
use hashbench::loader::{BatchLoader, BatchSink, LoadConfig};
use hashbench::report;
use log::warn;

#[tokio::main]
async fn main() -> Result<()> {
    hashbench::init_process()?;

    let load_config = LoadConfig::new(
        config::resolve_total_records(),
        config::resolve_search_batch_size(),
    );
    report::print_load_plan(
        load_config.target,
        load_config.batch_size,
        "hash_keyword (keyword), hash_text (text)",
    );

    let mut loader = BatchLoader::new(load_config)?;
    let mut sink = SearchSink::new(&config::resolve_search_url(), SEARCH_INDEX)?;

    let outcome = loader.run(&mut sink, report::print_progress).await;

    if let Err(err) = sink.disconnect().await {
        warn!("Closing client failed: {err:#}");
    }

    let load = outcome?;
    report::print_load_summary(&load);
    load.into_result()
}
