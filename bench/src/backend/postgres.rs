//! PostgreSQL backend.
//!
//! One table, three copies of the same hash per row:
//!
//! | Column         | Index  |
//! |----------------|--------|
//! | `hash_btree`   | B-tree |
//! | `hash_hash`    | Hash   |
//! | `hash_noindex` | none   |
//!
//! Lookups go through two client layers: `sqlx` as the thin driver and
//! `sea-orm` as the ORM (both its raw-statement path and its query builder).

use super::hash_record;
use crate::loader::BatchSink;
use crate::plan::PlanProbe;
use crate::runner::Strategy;
use anyhow::{bail, Context, Result};
use bench_core::constants::PG_TABLE;
use bench_core::corpus::SeedRecord;
use chrono::{DateTime, Utc};
use log::{info, LevelFilter};
use sea_orm::{
    ColumnTrait, ConnectOptions as OrmConnectOptions, Database, DatabaseConnection, DbBackend,
    EntityTrait, QueryFilter, Statement,
};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions};
use sqlx::{ConnectOptions, Connection};

/// Strategy every other relational strategy is compared against.
pub const BASELINE: &str = "Driver - B-tree";
/// Client-layer comparison printed after the results table.
pub const LAYER_COMPARISON: [&str; 2] = ["ORM Raw - B-tree", "ORM - B-tree"];

const SCHEMA_SQL: &str = "
DROP TABLE IF EXISTS hash_records;
CREATE TABLE hash_records (
    id           BIGSERIAL PRIMARY KEY,
    hash_btree   VARCHAR(64) NOT NULL,
    hash_hash    VARCHAR(64) NOT NULL,
    hash_noindex VARCHAR(64) NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    status       INTEGER NOT NULL DEFAULT 0,
    metadata     JSONB NOT NULL DEFAULT '{}'
);
CREATE INDEX hash_records_hash_btree_idx ON hash_records USING btree (hash_btree);
CREATE INDEX hash_records_hash_hash_idx ON hash_records USING hash (hash_hash);
";

/// Whole batch in one statement: column arrays are bound once and unnested
/// server side, which keeps the parameter count at four regardless of size.
const INSERT_SQL: &str = "
INSERT INTO hash_records (hash_btree, hash_hash, hash_noindex, created_at, status, metadata)
SELECT h, h, h, c, s, m::jsonb
FROM UNNEST($1::text[], $2::timestamptz[], $3::int4[], $4::text[]) AS t(h, c, s, m)
";

const ROW_COUNT_SQL: &str = "SELECT COUNT(*) FROM hash_records";
const TABLE_SIZE_SQL: &str = "SELECT pg_size_pretty(pg_total_relation_size('hash_records'))";
const INDEX_SIZES_SQL: &str = "
SELECT indexname::text, pg_size_pretty(pg_relation_size(indexname::regclass))
FROM pg_indexes WHERE tablename = 'hash_records' ORDER BY indexname
";
const RANDOM_ROW_SQL: &str =
    "SELECT hash_btree, hash_hash, hash_noindex FROM hash_records ORDER BY RANDOM() LIMIT 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashColumn {
    Btree,
    Hash,
    NoIndex,
}

impl HashColumn {
    pub const ALL: [HashColumn; 3] = [HashColumn::Btree, HashColumn::Hash, HashColumn::NoIndex];

    pub fn column(self) -> &'static str {
        match self {
            HashColumn::Btree => "hash_btree",
            HashColumn::Hash => "hash_hash",
            HashColumn::NoIndex => "hash_noindex",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HashColumn::Btree => "B-tree",
            HashColumn::Hash => "Hash",
            HashColumn::NoIndex => "No Index",
        }
    }

    /// Unindexed lookups scan the whole table.
    pub fn is_expensive(self) -> bool {
        self == HashColumn::NoIndex
    }

    /// Point lookup; the scan stops at the first match.
    pub fn lookup_sql(self) -> &'static str {
        match self {
            HashColumn::Btree => "SELECT * FROM hash_records WHERE hash_btree = $1",
            HashColumn::Hash => "SELECT * FROM hash_records WHERE hash_hash = $1",
            HashColumn::NoIndex => "SELECT * FROM hash_records WHERE hash_noindex = $1 LIMIT 1",
        }
    }

    pub fn explain_sql(self) -> &'static str {
        match self {
            HashColumn::Btree => "EXPLAIN ANALYZE SELECT * FROM hash_records WHERE hash_btree = $1",
            HashColumn::Hash => "EXPLAIN ANALYZE SELECT * FROM hash_records WHERE hash_hash = $1",
            HashColumn::NoIndex => {
                "EXPLAIN ANALYZE SELECT * FROM hash_records WHERE hash_noindex = $1"
            }
        }
    }

    fn orm_column(self) -> hash_record::Column {
        match self {
            HashColumn::Btree => hash_record::Column::HashBtree,
            HashColumn::Hash => hash_record::Column::HashHash,
            HashColumn::NoIndex => hash_record::Column::HashNoindex,
        }
    }
}

/// One existing value per indexed column, drawn from a single random row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgLookupKeys {
    pub btree: String,
    pub hash: String,
    pub noindex: String,
}

impl PgLookupKeys {
    pub fn key(&self, column: HashColumn) -> &str {
        match column {
            HashColumn::Btree => &self.btree,
            HashColumn::Hash => &self.hash,
            HashColumn::NoIndex => &self.noindex,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableStats {
    pub rows: i64,
    pub table_size: String,
    pub index_sizes: Vec<(String, String)>,
}

fn connect_options(url: &str) -> Result<PgConnectOptions> {
    let options = url
        .parse::<PgConnectOptions>()
        .context("Invalid DATABASE_URL")?;
    // Per-statement logging would be timed as part of every lookup.
    Ok(options.log_statements(LevelFilter::Off))
}

/// Thin-driver pool holding a single connection.
pub async fn connect_driver(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options(url)?)
        .await
        .context("Failed to connect the driver pool to PostgreSQL")
}

pub async fn connect_orm(url: &str) -> Result<DatabaseConnection> {
    let mut options = OrmConnectOptions::new(url);
    options.max_connections(1).sqlx_logging(false);
    Database::connect(options)
        .await
        .context("Failed to connect the ORM to PostgreSQL")
}

pub async fn table_stats(pool: &PgPool) -> Result<TableStats> {
    let rows: i64 = sqlx::query_scalar(ROW_COUNT_SQL)
        .fetch_one(pool)
        .await
        .context("Failed to count rows")?;
    let table_size: String = sqlx::query_scalar(TABLE_SIZE_SQL)
        .fetch_one(pool)
        .await
        .context("Failed to read table size")?;
    let index_sizes: Vec<(String, String)> = sqlx::query_as(INDEX_SIZES_SQL)
        .fetch_all(pool)
        .await
        .context("Failed to read index sizes")?;

    Ok(TableStats {
        rows,
        table_size,
        index_sizes,
    })
}

/// Picks one random existing row. An empty table is a setup error.
pub async fn random_keys(pool: &PgPool) -> Result<PgLookupKeys> {
    let row: Option<(String, String, String)> = sqlx::query_as(RANDOM_ROW_SQL)
        .fetch_optional(pool)
        .await
        .context("Failed to sample a random row")?;

    match row {
        Some((btree, hash, noindex)) => Ok(PgLookupKeys {
            btree,
            hash,
            noindex,
        }),
        None => bail!("{PG_TABLE} is empty; run pg-seed before benchmarking"),
    }
}

fn with_cost(strategy: Strategy<'_>, column: HashColumn) -> Strategy<'_> {
    if column.is_expensive() {
        strategy.expensive()
    } else {
        strategy
    }
}

fn driver<'a>(pool: &'a PgPool, keys: &'a PgLookupKeys, column: HashColumn) -> Strategy<'a> {
    let key = keys.key(column);
    let strategy = Strategy::new(format!("Driver - {}", column.label()), move || {
        sqlx::query(column.lookup_sql()).bind(key).fetch_all(pool)
    });
    with_cost(strategy, column)
}

fn orm_raw<'a>(
    db: &'a DatabaseConnection,
    keys: &'a PgLookupKeys,
    column: HashColumn,
) -> Strategy<'a> {
    let key = keys.key(column);
    let strategy = Strategy::new(format!("ORM Raw - {}", column.label()), move || {
        hash_record::Entity::find()
            .from_raw_sql(Statement::from_sql_and_values(
                DbBackend::Postgres,
                column.lookup_sql(),
                [key.into()],
            ))
            .all(db)
    });
    with_cost(strategy, column)
}

fn orm<'a>(db: &'a DatabaseConnection, keys: &'a PgLookupKeys, column: HashColumn) -> Strategy<'a> {
    let key = keys.key(column);
    let strategy = Strategy::new(format!("ORM - {}", column.label()), move || {
        hash_record::Entity::find()
            .filter(column.orm_column().eq(key))
            .one(db)
    });
    with_cost(strategy, column)
}

/// All relational strategies in report order. Indexed lookups come first so
/// the slow full scans run last.
pub fn strategies<'a>(
    pool: &'a PgPool,
    db: &'a DatabaseConnection,
    keys: &'a PgLookupKeys,
) -> Vec<Strategy<'a>> {
    use HashColumn::*;
    vec![
        orm_raw(db, keys, Btree),
        orm_raw(db, keys, Hash),
        driver(pool, keys, Btree),
        driver(pool, keys, Hash),
        orm(db, keys, Btree),
        orm(db, keys, Hash),
        driver(pool, keys, NoIndex),
        orm_raw(db, keys, NoIndex),
        orm(db, keys, NoIndex),
    ]
}

pub async fn explain(pool: &PgPool, column: HashColumn, key: &str) -> Result<Vec<String>> {
    sqlx::query_scalar(column.explain_sql())
        .bind(key)
        .fetch_all(pool)
        .await
        .with_context(|| format!("EXPLAIN ANALYZE on {} failed", column.column()))
}

pub fn explain_probes<'a>(pool: &'a PgPool, keys: &'a PgLookupKeys) -> Vec<PlanProbe<'a>> {
    HashColumn::ALL
        .into_iter()
        .map(|column| {
            PlanProbe::new(
                format!("{} ({})", column.label(), column.column()),
                explain(pool, column, keys.key(column)),
            )
        })
        .collect()
}

/// Loader target writing through one dedicated connection.
pub struct PgSink {
    options: PgConnectOptions,
    conn: Option<PgConnection>,
}

impl PgSink {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = connect_options(url)?;
        let conn = PgConnection::connect_with(&options)
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(Self {
            options,
            conn: Some(conn),
        })
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.conn
            .as_mut()
            .context("No open PostgreSQL connection")
    }
}

/// Column-wise copy of a batch, ready to bind as arrays.
struct InsertColumns {
    hashes: Vec<String>,
    created_at: Vec<DateTime<Utc>>,
    status: Vec<i32>,
    metadata: Vec<String>,
}

impl InsertColumns {
    fn from_batch(batch: &[SeedRecord]) -> Self {
        let mut columns = Self {
            hashes: Vec::with_capacity(batch.len()),
            created_at: Vec::with_capacity(batch.len()),
            status: Vec::with_capacity(batch.len()),
            metadata: Vec::with_capacity(batch.len()),
        };
        for record in batch {
            columns.hashes.push(record.hash.clone());
            columns.created_at.push(record.created_at);
            columns.status.push(record.status);
            columns.metadata.push(record.metadata.to_string());
        }
        columns
    }
}

impl BatchSink for PgSink {
    async fn prepare(&mut self) -> Result<()> {
        info!("Recreating {PG_TABLE} with B-tree and hash indexes");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(self.conn()?)
            .await
            .with_context(|| format!("Failed to recreate {PG_TABLE}"))?;
        Ok(())
    }

    async fn write_batch(&mut self, batch: &[SeedRecord]) -> Result<()> {
        let columns = InsertColumns::from_batch(batch);
        let done = sqlx::query(INSERT_SQL)
            .bind(columns.hashes)
            .bind(columns.created_at)
            .bind(columns.status)
            .bind(columns.metadata)
            .execute(self.conn()?)
            .await
            .context("Bulk insert failed")?;

        if done.rows_affected() != batch.len() as u64 {
            bail!(
                "Bulk insert wrote {} of {} rows",
                done.rows_affected(),
                batch.len()
            );
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.context("Failed to close connection")?;
        }
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        let conn = PgConnection::connect_with(&self.options)
            .await
            .context("Failed to reconnect to PostgreSQL")?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        // Fresh planner statistics for the benchmark that follows.
        sqlx::query("ANALYZE hash_records")
            .execute(self.conn()?)
            .await
            .context("ANALYZE failed")?;
        Ok(())
    }
}
