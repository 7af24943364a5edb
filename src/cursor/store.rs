//! Watermark and candidate lookups against the destination

use super::window::Window;
use crate::error::{Error, Result};
use crate::schema::EntitySpec;
use crate::sink::{detail_candidates_sql, watermark_sql, Sink};
use crate::types::{parse_timestamp, EntityId, JsonValue};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// First-ever window start when a table has no data yet
pub const DEFAULT_BOOTSTRAP: &str = "2020-06-01";

/// Computes extraction windows and detail candidates from what the
/// primary sink already holds. Keeps no state of its own.
#[derive(Clone)]
pub struct CursorStore {
    sink: Arc<dyn Sink>,
    bootstrap: DateTime<Utc>,
    end_offset: Duration,
}

impl CursorStore {
    pub fn new(sink: Arc<dyn Sink>, bootstrap: DateTime<Utc>) -> Self {
        Self {
            sink,
            bootstrap,
            end_offset: Duration::zero(),
        }
    }

    /// Shift the computed window end, for sources reporting local time
    #[must_use]
    pub fn with_end_offset(mut self, offset: Duration) -> Self {
        self.end_offset = offset;
        self
    }

    pub fn bootstrap(&self) -> DateTime<Utc> {
        self.bootstrap
    }

    /// Resolve the window for `table`, ending now
    pub fn resolve_window(
        &self,
        table: &str,
        cursor_key: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Window> {
        self.resolve_window_at(table, cursor_key, start, end, Utc::now())
    }

    /// Resolve the window for `table` as of `now`.
    ///
    /// Explicit dates win when both are given. Otherwise the window runs
    /// from the table's watermark (or the bootstrap date when the table or
    /// column does not exist yet) to `now`.
    pub fn resolve_window_at(
        &self,
        table: &str,
        cursor_key: &str,
        start: Option<&str>,
        end: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Window> {
        match (start, end) {
            (Some(start), Some(end)) => return Window::from_dates(start, end),
            (None, None) => {}
            _ => {
                return Err(Error::invalid_request(
                    "start and end must be given together",
                ))
            }
        }

        let end = now + self.end_offset;
        let start = self.watermark(table, cursor_key)?.unwrap_or(self.bootstrap);
        let window = Window::new(start.min(end), end)?;

        info!(
            "{}: window {} -> {}",
            table,
            window.start_param(),
            window.end_param()
        );
        Ok(window)
    }

    /// Highest cursor value in `table`, `None` when nothing is loaded yet
    pub fn watermark(&self, table: &str, cursor_key: &str) -> Result<Option<DateTime<Utc>>> {
        let sql = watermark_sql(&self.sink.relation(table), cursor_key)?;
        let rows = match self.sink.query(&sql) {
            Ok(rows) => rows,
            Err(e) if e.is_missing_relation() => {
                debug!("{}: no watermark yet ({})", table, e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        Ok(rows
            .first()
            .and_then(|row| row.get("watermark"))
            .and_then(JsonValue::as_str)
            .and_then(parse_timestamp))
    }

    /// Ids of `parent` whose details are missing or stale, minus deleted ids
    pub fn detail_candidates(
        &self,
        details: &EntitySpec,
        parent: &EntitySpec,
        limit: usize,
    ) -> Result<Vec<EntityId>> {
        let key = details.require_id_key()?;
        let cursor = details.require_cursor_key()?;
        let deleted = details
            .deleted_spec()
            .ok_or_else(|| Error::unsupported(&details.name, "deletion tracking"))?;

        self.sink.ensure_table(details)?;
        self.sink.ensure_table(&deleted)?;

        let sql = detail_candidates_sql(
            &self.sink.relation(&parent.name),
            &self.sink.relation(&details.name),
            &self.sink.relation(&deleted.name),
            key,
            cursor,
            limit,
        )?;

        let rows = match self.sink.query(&sql) {
            Ok(rows) => rows,
            Err(e) if e.is_missing_relation() => {
                debug!("{}: parent {} not loaded yet", details.name, parent.name);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let ids: Vec<EntityId> = rows
            .iter()
            .filter_map(|row| row.get("id").and_then(EntityId::from_json))
            .collect();
        info!("{}: {} detail candidates", details.name, ids.len());
        Ok(ids)
    }
}

impl std::fmt::Debug for CursorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorStore")
            .field("sink", &self.sink.name())
            .field("bootstrap", &self.bootstrap)
            .field("end_offset", &self.end_offset)
            .finish()
    }
}
