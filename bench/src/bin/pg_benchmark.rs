//! Point-lookup benchmark across PostgreSQL index types and client layers.
//!
//! Usage:
//!   cargo run --release --bin pg-benchmark
//!   HASHBENCH_ITERATIONS=500 cargo run --release --bin pg-benchmark

use anyhow::Result;
use bench_core::config;
use hashbench::backend::postgres::{self, PgLookupKeys, TableStats, BASELINE, LAYER_COMPARISON};
use hashbench::plan::print_plans;
use hashbench::report;
use hashbench::runner::{ComparativeRunner, RunnerConfig};
use log::{info, warn};
use sea_orm::DatabaseConnection;
use sqlx::PgPool;

fn print_table_stats(stats: &TableStats) {
    println!("Table statistics:");
    println!("   Rows: {}", report::group_thousands(stats.rows.max(0) as u64));
    println!("   Table size: {}", stats.table_size);
    println!("   Index sizes:");
    for (index, size) in &stats.index_sizes {
        println!("     - {index}: {size}");
    }
}

fn print_keys(keys: &PgLookupKeys) {
    println!("\nLookup keys:");
    println!("   B-tree:   {}", keys.btree);
    println!("   Hash:     {}", keys.hash);
    println!("   No Index: {}", keys.noindex);
}

async fn benchmark(pool: &PgPool, db: &DatabaseConnection) -> Result<()> {
    let runner =
        ComparativeRunner::new(RunnerConfig::with_iterations(config::resolve_iterations()));

    report::print_header("PostgreSQL hash lookup benchmark");
    print_table_stats(&postgres::table_stats(pool).await?);

    let keys = postgres::random_keys(pool).await?;
    print_keys(&keys);

    println!(
        "\nMeasuring ({} warmup calls, {} iterations):\n",
        runner.config().warmup,
        runner.config().iterations
    );
    let results = runner.run(postgres::strategies(pool, db, &keys)).await?;

    report::print_results(&results);
    report::print_relative(&results, BASELINE, &LAYER_COMPARISON);

    print_plans("Query plans", postgres::explain_probes(pool, &keys)).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    hashbench::init_process()?;

    let url = config::resolve_database_url();
    let pool = postgres::connect_driver(&url).await?;
    let db = match postgres::connect_orm(&url).await {
        Ok(db) => db,
        Err(err) => {
            pool.close().await;
            return Err(err);
        }
    };

    let outcome = benchmark(&pool, &db).await;

    pool.close().await;
    if let Err(err) = db.close().await {
        warn!("Closing ORM connection failed: {err}");
    }
    info!("Connections closed");
    outcome
}
