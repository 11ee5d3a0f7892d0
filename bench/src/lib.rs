//! Point-Lookup Latency Benchmark
//!
//! Measures how fast a single row/document can be found by an exact 64-char
//! hex hash across several access paths:
//! - **PostgreSQL**: B-tree, hash and unindexed columns, each queried through
//!   a thin driver, an ORM raw statement and the ORM query builder
//! - **OpenSearch**: the same value stored as `keyword` and as `text`,
//!   queried with term, match, match_phrase and bool-filter variants
//!
//! Datasets are created by the resilient bulk loader (`pg-seed`,
//! `search-seed`) and measured by `pg-benchmark` / `search-benchmark`.
//!
//! Run benchmarks: `cargo bench`
//! Run tests: `cargo test`

pub mod backend;
pub mod harness;
pub mod loader;
pub mod plan;
pub mod report;
pub mod runner;

use bench_core::config;

/// Loads `.env` and installs the logger. Every binary calls this first.
pub fn init_process() -> anyhow::Result<()> {
    config::load_dotenv();
    let log_file = config::resolve_log_file();
    bench_core::initialize_logger(config::resolve_log_level(), log_file.as_deref())
}
