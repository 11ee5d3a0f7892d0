//! Point-lookup benchmark of OpenSearch keyword vs text queries.
//!
//! Usage:
//!   cargo run --release --bin search-benchmark

use anyhow::Result;
use bench_core::config;
use bench_core::constants::SEARCH_INDEX;
use hashbench::backend::search::{
    self, IndexStats, SearchClient, SearchLookupKeys, SearchQuery, BASELINE,
};
use hashbench::plan::print_plans;
use hashbench::report;
use hashbench::runner::{ComparativeRunner, RunnerConfig};

fn print_index_stats(index: &str, stats: &IndexStats) {
    println!("Index statistics ({index}):");
    println!("   Documents: {}", report::group_thousands(stats.docs));
    println!(
        "   Store size: {:.2} MB",
        stats.store_bytes as f64 / 1024.0 / 1024.0
    );
    println!("   Mapping:");
    for (field, kind) in &stats.fields {
        println!("     - {field}: {kind}");
    }
}

fn print_keys(keys: &SearchLookupKeys) {
    println!("\nLookup keys:");
    println!("   keyword: {}", keys.keyword);
    println!("   text:    {}", keys.text);
}

#[tokio::main]
async fn main() -> Result<()> {
    hashbench::init_process()?;

    let client = SearchClient::new(&config::resolve_search_url(), SEARCH_INDEX)?;
    let runner =
        ComparativeRunner::new(RunnerConfig::with_iterations(config::resolve_iterations()));

    report::print_header("OpenSearch hash lookup benchmark");
    print_index_stats(client.index(), &client.stats().await?);

    let keys = client.random_keys().await?;
    print_keys(&keys);

    println!(
        "\nMeasuring ({} warmup calls, {} iterations):\n",
        runner.config().warmup,
        runner.config().iterations
    );
    let results = runner.run(search::strategies(&client, &keys)).await?;

    report::print_results(&results);
    let candidates = SearchQuery::ALL.map(SearchQuery::label);
    report::print_relative(&results, BASELINE, &candidates);

    print_plans("Query profiles", search::profile_probes(&client, &keys)).await;
    Ok(())
}
