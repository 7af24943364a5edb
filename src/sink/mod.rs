//! Sink module
//!
//! Bulk loading of transformed rows into destination tables.
//!
//! # Overview
//!
//! - **Truncate**: replace the table contents with the batch (dimensions)
//! - **Append + Reconcile**: append, then collapse to one row per primary
//!   key keeping the greatest cursor (incremental and details entities)
//! - **Append**: plain append (deletion markers)
//!
//! Every write creates the destination table first if it does not exist.
//! The warehouse and the relational mirror are both DuckDB connections;
//! the mirror attaches Postgres through DuckDB's postgres extension.

mod duckdb_sink;
mod queries;
mod reconcile;

pub use duckdb_sink::{DuckDbSink, RELATIONAL_CATALOG};
pub use queries::{detail_candidates_sql, watermark_sql, DETAIL_CANDIDATES_SQL, WATERMARK_SQL};
pub use reconcile::{ReconciliationQuery, RECONCILE_SQL};

use crate::error::Result;
use crate::schema::EntitySpec;
use crate::types::{JsonObject, WriteMode};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of one sink write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    /// Sink the rows went to
    #[serde(rename = "load")]
    pub sink: String,
    /// Rows the sink reports as written
    pub output_rows: usize,
}

impl LoadResult {
    pub fn new(sink: impl Into<String>, output_rows: usize) -> Self {
        Self {
            sink: sink.into(),
            output_rows,
        }
    }
}

/// A destination store for transformed rows
pub trait Sink: Send + Sync {
    /// Short name used in load results and logs
    fn name(&self) -> &str;

    /// Fully qualified, quoted relation for a table
    fn relation(&self, table: &str) -> String;

    /// Create the table for an entity if it does not exist
    fn ensure_table(&self, entity: &EntitySpec) -> Result<()>;

    /// Replace the table contents with `rows`
    fn truncate_load(&self, entity: &EntitySpec, rows: &[JsonObject]) -> Result<LoadResult>;

    /// Append `rows` to the table
    fn append(&self, entity: &EntitySpec, rows: &[JsonObject]) -> Result<LoadResult>;

    /// Run a multi-statement script atomically
    fn execute(&self, sql: &str) -> Result<()>;

    /// Run a query and return its rows as JSON objects
    fn query(&self, sql: &str) -> Result<Vec<JsonObject>>;

    /// Collapse the table to one row per primary key
    fn reconcile(&self, entity: &EntitySpec) -> Result<()> {
        let (relation, staging) = self.relation_for(entity);
        let sql = ReconciliationQuery::for_entity(relation, staging, entity)?.render()?;
        self.execute(&sql)?;
        info!("{}: reconciled {}", self.name(), entity.name);
        Ok(())
    }

    /// Append `rows`, then reconcile the table
    fn append_reconcile(&self, entity: &EntitySpec, rows: &[JsonObject]) -> Result<LoadResult> {
        let result = self.append(entity, rows)?;
        self.reconcile(entity)?;
        Ok(result)
    }

    /// Write `rows` with the entity's write mode
    fn load(&self, entity: &EntitySpec, rows: &[JsonObject]) -> Result<LoadResult> {
        match entity.write_mode() {
            WriteMode::Truncate => self.truncate_load(entity, rows),
            WriteMode::AppendReconcile => self.append_reconcile(entity, rows),
            WriteMode::Append => self.append(entity, rows),
        }
    }

    /// Relation and staging relation for an entity's table
    fn relation_for(&self, entity: &EntitySpec) -> (String, String) {
        (
            self.relation(&entity.name),
            self.relation(&format!("_dedup_{}", entity.name)),
        )
    }
}
