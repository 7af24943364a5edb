//! DuckDB-backed sinks
//!
//! Rows are staged as newline-delimited JSON in a temp file and inserted
//! with `read_json`, typed by the entity schema. Query results come back
//! through `COPY ... TO` a temp JSON file.

use super::{LoadResult, Sink};
use crate::error::{Error, Result};
use crate::schema::{quote_ident, quote_literal, EntitySpec, NestedEncoding};
use crate::types::{JsonObject, JsonValue};
use duckdb::Connection;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Catalog name the Postgres mirror is attached under
pub const RELATIONAL_CATALOG: &str = "relational";

/// Sink writing into a DuckDB database, or a database attached to one
pub struct DuckDbSink {
    name: String,
    conn: Mutex<Connection>,
    catalog: Option<String>,
    schema: String,
    nested: NestedEncoding,
}

impl DuckDbSink {
    /// Open (or create) a DuckDB warehouse file; `:memory:` for a transient one.
    ///
    /// Relations are qualified with the database's own catalog, which DuckDB
    /// names after the file stem and which may collide with the schema name.
    pub fn open(path: &str, schema: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| Error::config(format!("Failed to open DuckDB at '{path}': {e}")))?;

        let catalog: String = conn
            .query_row("SELECT current_database()", [], |row| row.get(0))
            .map_err(|e| Error::config(format!("Failed to read catalog of '{path}': {e}")))?;
        debug!("Warehouse {} uses catalog {}", path, catalog);

        Self::with_connection(
            "warehouse",
            conn,
            Some(catalog),
            schema,
            NestedEncoding::Struct,
        )
    }

    /// In-memory warehouse, mostly for tests
    pub fn in_memory(schema: &str) -> Result<Self> {
        Self::open(":memory:", schema)
    }

    /// Relational mirror: a Postgres database attached through DuckDB
    pub fn postgres(url: &str, schema: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;

        conn.execute_batch("INSTALL postgres; LOAD postgres;")
            .map_err(|e| Error::config(format!("Failed to load postgres extension: {e}")))?;

        let attach_sql = format!(
            "ATTACH {} AS {} (TYPE POSTGRES);",
            quote_literal(url),
            RELATIONAL_CATALOG
        );
        conn.execute_batch(&attach_sql)
            .map_err(|e| Error::config(format!("Failed to attach PostgreSQL: {e}")))?;

        Self::with_connection(
            "relational",
            conn,
            Some(RELATIONAL_CATALOG.to_string()),
            schema,
            NestedEncoding::Json,
        )
    }

    /// Wrap an existing connection
    pub fn with_connection(
        name: impl Into<String>,
        conn: Connection,
        catalog: Option<String>,
        schema: &str,
        nested: NestedEncoding,
    ) -> Result<Self> {
        let sink = Self {
            name: name.into(),
            conn: Mutex::new(conn),
            catalog,
            schema: schema.to_string(),
            nested,
        };

        let qualified_schema = match &sink.catalog {
            Some(catalog) => format!("{}.{}", quote_ident(catalog), quote_ident(schema)),
            None => quote_ident(schema),
        };
        sink.lock()?
            .execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS {qualified_schema};"))
            .map_err(|e| Error::sink(&sink.name, format!("Failed to create schema: {e}")))?;

        Ok(sink)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::sink(&self.name, "connection lock poisoned"))
    }

    /// Turn a DuckDB failure into a sink error, flagging absent tables/columns
    fn map_error(&self, relation: &str, e: &duckdb::Error) -> Error {
        let message = e.to_string();
        if is_missing_object(&message) {
            Error::MissingRelation {
                relation: relation.to_string(),
                message,
            }
        } else {
            Error::sink(&self.name, message)
        }
    }

    fn insert_sql(&self, entity: &EntitySpec, path: &str) -> String {
        let columns = entity
            .schema
            .column_names()
            .into_iter()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({columns}) SELECT {columns} FROM read_json({}, format = 'newline_delimited', columns = {})",
            self.relation(&entity.name),
            quote_literal(path),
            entity.schema.json_columns(self.nested)
        )
    }

    fn insert(
        &self,
        conn: &Connection,
        entity: &EntitySpec,
        rows: &[JsonObject],
    ) -> Result<usize> {
        let staged = StagedRows::write(rows)?;
        let sql = self.insert_sql(entity, &staged.path_str()?);
        debug!("{}: {}", self.name, sql);

        let inserted = conn
            .execute(&sql, [])
            .map_err(|e| self.map_error(&self.relation(&entity.name), &e))?;

        if inserted != rows.len() {
            return Err(Error::RowCountMismatch {
                table: entity.name.clone(),
                submitted: rows.len(),
                reported: inserted,
            });
        }
        Ok(inserted)
    }

    fn create_table_sql(&self, entity: &EntitySpec) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.relation(&entity.name),
            entity.schema.column_definitions(self.nested)
        )
    }
}

impl Sink for DuckDbSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn relation(&self, table: &str) -> String {
        match &self.catalog {
            Some(catalog) => format!(
                "{}.{}.{}",
                quote_ident(catalog),
                quote_ident(&self.schema),
                quote_ident(table)
            ),
            None => format!("{}.{}", quote_ident(&self.schema), quote_ident(table)),
        }
    }

    fn ensure_table(&self, entity: &EntitySpec) -> Result<()> {
        self.lock()?
            .execute_batch(&self.create_table_sql(entity))
            .map_err(|e| Error::sink(&self.name, format!("Failed to create {}: {e}", entity.name)))
    }

    fn truncate_load(&self, entity: &EntitySpec, rows: &[JsonObject]) -> Result<LoadResult> {
        if rows.is_empty() {
            return Ok(LoadResult::new(&self.name, 0));
        }
        self.ensure_table(entity)?;

        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION;")?;
        let outcome = conn
            .execute_batch(&format!("DELETE FROM {};", self.relation(&entity.name)))
            .map_err(|e| self.map_error(&self.relation(&entity.name), &e))
            .and_then(|()| self.insert(&conn, entity, rows));

        let written = finish_transaction(&conn, outcome)?;
        info!("{}: replaced {} with {} rows", self.name, entity.name, written);
        Ok(LoadResult::new(&self.name, written))
    }

    fn append(&self, entity: &EntitySpec, rows: &[JsonObject]) -> Result<LoadResult> {
        if rows.is_empty() {
            return Ok(LoadResult::new(&self.name, 0));
        }
        self.ensure_table(entity)?;

        let conn = self.lock()?;
        let written = self.insert(&conn, entity, rows)?;
        info!("{}: appended {} rows to {}", self.name, written, entity.name);
        Ok(LoadResult::new(&self.name, written))
    }

    fn execute(&self, sql: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION;")?;
        let outcome = conn
            .execute_batch(sql)
            .map_err(|e| self.map_error(sql.trim(), &e));
        finish_transaction(&conn, outcome)
    }

    fn query(&self, sql: &str) -> Result<Vec<JsonObject>> {
        let target = TempPath::new("query", "json");
        let copy_sql = format!(
            "COPY ({}) TO {} (FORMAT JSON, ARRAY true);",
            sql.trim().trim_end_matches(';'),
            quote_literal(&target.path_str()?)
        );
        debug!("{}: {}", self.name, copy_sql);

        self.lock()?
            .execute_batch(&copy_sql)
            .map_err(|e| self.map_error(sql.trim(), &e))?;

        let content = std::fs::read_to_string(&target.0)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<JsonValue> = serde_json::from_str(&content)?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                JsonValue::Object(map) => Some(map),
                _ => None,
            })
            .collect())
    }
}

impl std::fmt::Debug for DuckDbSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbSink")
            .field("name", &self.name)
            .field("catalog", &self.catalog)
            .field("schema", &self.schema)
            .field("nested", &self.nested)
            .finish_non_exhaustive()
    }
}

/// Commit on success, roll back on failure or when the commit itself fails
fn finish_transaction<T>(conn: &Connection, outcome: Result<T>) -> Result<T> {
    let committed = outcome.and_then(|value| {
        conn.execute_batch("COMMIT;")?;
        Ok(value)
    });
    if committed.is_err() {
        let _ = conn.execute_batch("ROLLBACK;");
    }
    committed
}

/// Whether a DuckDB error means a table, schema or column does not exist.
///
/// Other binder failures (ambiguous names, type mismatches) are real errors.
fn is_missing_object(message: &str) -> bool {
    (message.contains("Catalog Error") && message.contains("does not exist"))
        || (message.contains("Binder Error") && message.contains("not found"))
}

/// Temp file removed on drop
struct TempPath(PathBuf);

impl TempPath {
    fn new(prefix: &str, extension: &str) -> Self {
        Self(std::env::temp_dir().join(format!(
            "caresoft_{prefix}_{}.{extension}",
            unique_suffix()
        )))
    }

    fn path_str(&self) -> Result<String> {
        self.0
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| Error::config("Invalid temp path"))
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Rows written to a newline-delimited JSON temp file
struct StagedRows(TempPath);

impl StagedRows {
    fn write(rows: &[JsonObject]) -> Result<Self> {
        let path = TempPath::new("stage", "ndjson");
        let mut writer = BufWriter::new(File::create(&path.0)?);
        for row in rows {
            serde_json::to_writer(&mut writer, row)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(Self(path))
    }

    fn path_str(&self) -> Result<String> {
        self.0.path_str()
    }
}

/// Process-unique suffix for temp files (timestamp + counter)
fn unique_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}_{timestamp:x}_{n}", std::process::id())
}
