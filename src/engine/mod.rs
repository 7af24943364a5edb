//! Execution engine module
//!
//! Runs one pipeline per trigger and fans runs out to the task queue.
//!
//! # Overview
//!
//! - `SyncOrchestrator` - Picks and runs the pipeline for an entity
//! - `TriggerRequest` / `TriggerResponse` - Trigger body and response
//! - `PipelineResult` - Per-stage outcome (`num_processed`, `output_rows`, loads)
//!
//! # Pipelines
//!
//! - **Dimension**: unpaged fetch, transform, truncate load
//! - **Incremental**: resolve window, paged fetch, transform, append and
//!   reconcile, then enqueue detail tasks for the loaded ids
//! - **Details**: candidate (or explicit) ids, per-id fetch, append and
//!   reconcile present rows, append deletion markers
//!
//! The sink step only starts once the whole fetch phase has succeeded, and
//! a fetch that returns no rows never touches a sink.

mod types;

pub use types::{
    FanoutResult, PipelineResult, RunResult, SyncConfig, Trigger, TriggerRequest,
    TriggerResponse, PIPELINES_NAME,
};

use crate::catalog::{Catalog, TaskGroup};
use crate::config::SyncSettings;
use crate::cursor::{parse_date, CursorStore, Window, DEFAULT_BOOTSTRAP};
use crate::details::DetailFetcher;
use crate::error::{Error, Result};
use crate::http::RateLimitedClient;
use crate::pagination::PageFetcher;
use crate::schema::EntitySpec;
use crate::sink::{DuckDbSink, Sink};
use crate::tasks::{
    chunk_detail_tasks, HttpTaskQueue, MemoryQueue, TaskEnqueuer, TaskPayload, BROADCAST_QUEUE,
    DETAILS_QUEUE, SYNC_QUEUE,
};
use crate::transform::{primary_key_ids, transform_rows};
use crate::types::{EntityId, EntityKind, JsonObject};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runs sync pipelines against the configured source, sinks and queues
pub struct SyncOrchestrator {
    catalog: Catalog,
    pages: PageFetcher,
    details: DetailFetcher,
    /// First sink is primary: its row counts are reported and cursors read from it
    sinks: Vec<Arc<dyn Sink>>,
    cursor: CursorStore,
    tasks: Arc<dyn TaskEnqueuer>,
    broadcast: Arc<dyn TaskEnqueuer>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn builder() -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::default()
    }

    /// Wire clients, sinks and queues from settings
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        settings.validate()?;

        let mut catalog = Catalog::builtin()?;
        if let Some(ref path) = settings.entities_file {
            catalog = catalog.extend_from_file(path)?;
        }

        let listing = Arc::new(RateLimitedClient::new(settings.listing_client_config())?);
        let detail = Arc::new(RateLimitedClient::new(settings.detail_client_config())?);

        let warehouse = DuckDbSink::open(&settings.warehouse_path, &settings.dataset)?;
        info!(
            "Warehouse sink: {} (schema {})",
            settings.warehouse_path, settings.dataset
        );

        let mut builder = Self::builder()
            .catalog(catalog)
            .page_fetcher(
                PageFetcher::new(listing, settings.page_size).with_concurrency(settings.concurrency),
            )
            .detail_fetcher(DetailFetcher::new(detail).with_concurrency(settings.concurrency))
            .sink(Arc::new(warehouse))
            .bootstrap(settings.bootstrap()?)
            .end_offset(settings.source_utc_offset())
            .config(
                SyncConfig::new()
                    .with_details_limit(settings.details_limit)
                    .with_detail_batch_size(settings.detail_batch_size),
            );

        if let Some(ref url) = settings.database_url {
            let mirror = DuckDbSink::postgres(url, &settings.database_schema)?;
            info!("Relational sink attached (schema {})", settings.database_schema);
            builder = builder.sink(Arc::new(mirror));
        }

        let timeout = Duration::from_secs(settings.timeout_secs);
        let token = settings.tasks_token.as_deref();
        builder = builder
            .task_queue(queue_for(
                settings.tasks_url.as_deref(),
                token,
                timeout,
                "tasks",
            )?)
            .broadcast_queue(queue_for(
                settings.broadcast_url.as_deref(),
                token,
                timeout,
                "broadcast",
            )?);

        builder.build()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }

    pub fn config(&self) -> SyncConfig {
        self.config
    }

    /// Handle one trigger body
    pub async fn handle(&self, request: &TriggerRequest) -> Result<TriggerResponse> {
        let results = match request.action()? {
            Trigger::Run {
                table,
                start,
                end,
                ids,
            } => {
                self.run_table(&table, start.as_deref(), end.as_deref(), &ids)
                    .await?
            }
            Trigger::Tasks { group, start, end } => {
                RunResult::Fanout(self.fan_out(group, start, end).await?)
            }
            Trigger::Broadcast => RunResult::Fanout(self.broadcast().await?),
        };
        Ok(TriggerResponse::new(results))
    }

    /// Run the pipeline for one table
    pub async fn run_table(
        &self,
        table: &str,
        start: Option<&str>,
        end: Option<&str>,
        ids: &[EntityId],
    ) -> Result<RunResult> {
        let entity = self.catalog.get(table)?;
        if !ids.is_empty() && entity.kind != EntityKind::Details {
            return Err(Error::invalid_request(format!(
                "ids only apply to details tables, not {table}"
            )));
        }

        let started = Instant::now();
        info!("Starting {:?} pipeline for {}", entity.kind, entity.name);

        let result = match entity.kind {
            EntityKind::Dimension => RunResult::Single(self.run_dimension(entity).await?),
            EntityKind::Incremental => {
                RunResult::Single(self.run_incremental(entity, start, end).await?)
            }
            EntityKind::Details => RunResult::Stages(self.run_details(entity, ids).await?),
            EntityKind::Deleted => return Err(Error::unsupported(&entity.name, "direct runs")),
        };

        info!(
            "Finished {} in {}ms",
            entity.name,
            started.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Fetch everything, replace the table
    pub async fn run_dimension(&self, entity: &EntitySpec) -> Result<PipelineResult> {
        let rows = self
            .pages
            .fetch_unpaged(&entity.endpoint, entity.row_key())
            .await?;

        let mut result = PipelineResult::new(&entity.name, rows.len());
        if rows.is_empty() {
            info!("{}: nothing to load", entity.name);
            return Ok(result);
        }

        let rows = transform_rows(&entity.schema, &rows);
        self.load_all(entity, &rows, &mut result)?;
        Ok(result)
    }

    /// Fetch one window, append and reconcile, then enqueue detail tasks
    pub async fn run_incremental(
        &self,
        entity: &EntitySpec,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<PipelineResult> {
        let cursor_key = entity.require_cursor_key()?;
        let params = entity
            .window
            .ok_or_else(|| Error::unsupported(&entity.name, "windowed listing"))?;

        let window = self
            .cursor
            .resolve_window(&entity.name, cursor_key, start, end)?;
        let query = params.query(&window, self.pages.page_size());

        let rows = self
            .pages
            .fetch_all(&entity.endpoint, entity.row_key(), &query)
            .await?;

        let mut result = PipelineResult::new(&entity.name, rows.len()).with_window(&window);
        if rows.is_empty() {
            info!("{}: nothing to load", entity.name);
            return Ok(result);
        }

        let rows = transform_rows(&entity.schema, &rows);
        self.load_all(entity, &rows, &mut result)?;

        if let Some(ref details) = entity.details {
            let key = entity.require_id_key()?;
            let ids = primary_key_ids(&rows, key);
            let tasks = chunk_detail_tasks(details, &ids, self.config.detail_batch_size);

            match self.tasks.enqueue(DETAILS_QUEUE, tasks).await {
                Ok(created) => result.tasks_created = Some(created),
                Err(e) => {
                    warn!("{}: failed to enqueue detail tasks: {}", entity.name, e);
                    result.errors.push(format!("{DETAILS_QUEUE}: {e}"));
                }
            }
        }

        Ok(result)
    }

    /// Fetch details for candidate or explicit ids; returns the details
    /// stage followed by the deletion-marker stage
    pub async fn run_details(
        &self,
        entity: &EntitySpec,
        ids: &[EntityId],
    ) -> Result<Vec<PipelineResult>> {
        let key = entity.require_id_key()?;
        let deleted = entity
            .deleted_spec()
            .ok_or_else(|| Error::unsupported(&entity.name, "deletion tracking"))?;

        let ids = if ids.is_empty() {
            let parent = entity
                .parent
                .as_deref()
                .ok_or_else(|| Error::unsupported(&entity.name, "candidate lookup"))?;
            let parent = self.catalog.get(parent)?;
            self.cursor
                .detail_candidates(entity, parent, self.config.details_limit)?
        } else {
            ids.to_vec()
        };

        if ids.is_empty() {
            info!("{}: no detail candidates", entity.name);
            return Ok(vec![
                PipelineResult::new(&entity.name, 0),
                PipelineResult::new(&deleted.name, 0),
            ]);
        }

        let batch = self.details.fetch_many(entity, &ids).await?;

        let mut present = PipelineResult::new(&entity.name, batch.present.len());
        if !batch.present.is_empty() {
            let rows = transform_rows(&entity.schema, &batch.present);
            self.load_all(entity, &rows, &mut present)?;
        }

        let mut gone = PipelineResult::new(&deleted.name, batch.deleted.len());
        if !batch.deleted.is_empty() {
            let rows = batch.deleted_rows(key);
            self.load_all(&deleted, &rows, &mut gone)?;
        }

        Ok(vec![present, gone])
    }

    /// Enqueue one run per entity of `group`
    pub async fn fan_out(
        &self,
        group: TaskGroup,
        start: Option<String>,
        end: Option<String>,
    ) -> Result<FanoutResult> {
        match (start.as_deref(), end.as_deref()) {
            (Some(s), Some(e)) => {
                Window::from_dates(s, e)?;
            }
            (None, None) => {}
            _ => {
                return Err(Error::invalid_request(
                    "start and end must be given together",
                ))
            }
        }

        let tasks: Vec<TaskPayload> = self
            .catalog
            .group(group)
            .into_iter()
            .map(|e| TaskPayload::table(&e.name).with_window(start.clone(), end.clone()))
            .collect();

        info!("Fanning out {} task(s) for group {}", tasks.len(), group);
        let created = self.tasks.enqueue(SYNC_QUEUE, tasks).await?;
        Ok(FanoutResult::Tasks(created))
    }

    /// Publish one message per entity
    pub async fn broadcast(&self) -> Result<FanoutResult> {
        let messages: Vec<TaskPayload> = self
            .catalog
            .group(TaskGroup::All)
            .into_iter()
            .map(|e| TaskPayload::table(&e.name))
            .collect();

        let sent = self.broadcast.enqueue(BROADCAST_QUEUE, messages).await?;
        Ok(FanoutResult::MessageSent(sent))
    }

    /// Write `rows` to every sink. A primary failure aborts the run; a
    /// secondary failure is recorded on the result.
    fn load_all(
        &self,
        entity: &EntitySpec,
        rows: &[JsonObject],
        result: &mut PipelineResult,
    ) -> Result<()> {
        for (index, sink) in self.sinks.iter().enumerate() {
            match sink.load(entity, rows) {
                Ok(load) => {
                    info!(
                        "{}: loaded {} row(s) into {}",
                        sink.name(),
                        load.output_rows,
                        entity.name
                    );
                    if index == 0 {
                        result.output_rows = Some(load.output_rows);
                    }
                    result.loads.push(load);
                }
                Err(e) if index == 0 => return Err(e),
                Err(e) => {
                    warn!("{}: load of {} failed: {}", sink.name(), entity.name, e);
                    result.errors.push(format!("{}: {}", sink.name(), e));
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("entities", &self.catalog.names())
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn queue_for(
    url: Option<&str>,
    token: Option<&str>,
    timeout: Duration,
    label: &str,
) -> Result<Arc<dyn TaskEnqueuer>> {
    match url {
        Some(url) => {
            let mut queue = HttpTaskQueue::new(url, timeout)?;
            if let Some(token) = token {
                queue = queue.with_bearer_token(token);
            }
            Ok(Arc::new(queue))
        }
        None => {
            warn!("No {} endpoint configured, keeping payloads in memory", label);
            Ok(Arc::new(MemoryQueue::new()))
        }
    }
}

/// Builder for [`SyncOrchestrator`]
#[derive(Default)]
pub struct SyncOrchestratorBuilder {
    catalog: Option<Catalog>,
    pages: Option<PageFetcher>,
    details: Option<DetailFetcher>,
    sinks: Vec<Arc<dyn Sink>>,
    tasks: Option<Arc<dyn TaskEnqueuer>>,
    broadcast: Option<Arc<dyn TaskEnqueuer>>,
    bootstrap: Option<DateTime<Utc>>,
    end_offset: Option<ChronoDuration>,
    config: SyncConfig,
}

impl SyncOrchestratorBuilder {
    /// Entity catalog; the built-in one when unset
    pub fn catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn page_fetcher(mut self, pages: PageFetcher) -> Self {
        self.pages = Some(pages);
        self
    }

    pub fn detail_fetcher(mut self, details: DetailFetcher) -> Self {
        self.details = Some(details);
        self
    }

    /// Add a sink; the first one added is primary
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Queue for detail tasks and fan-out runs; in-memory when unset
    pub fn task_queue(mut self, queue: Arc<dyn TaskEnqueuer>) -> Self {
        self.tasks = Some(queue);
        self
    }

    /// Topic for broadcasts; the task queue when unset
    pub fn broadcast_queue(mut self, queue: Arc<dyn TaskEnqueuer>) -> Self {
        self.broadcast = Some(queue);
        self
    }

    pub fn bootstrap(mut self, bootstrap: DateTime<Utc>) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn end_offset(mut self, offset: ChronoDuration) -> Self {
        self.end_offset = Some(offset);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<SyncOrchestrator> {
        let catalog = match self.catalog {
            Some(catalog) => catalog,
            None => Catalog::builtin()?,
        };
        let pages = self
            .pages
            .ok_or_else(|| Error::config("a page fetcher is required"))?;
        let details = self
            .details
            .ok_or_else(|| Error::config("a detail fetcher is required"))?;
        let primary = self
            .sinks
            .first()
            .cloned()
            .ok_or_else(|| Error::config("at least one sink is required"))?;

        let bootstrap = match self.bootstrap {
            Some(bootstrap) => bootstrap,
            None => parse_date(DEFAULT_BOOTSTRAP)?,
        };
        let mut cursor = CursorStore::new(primary, bootstrap);
        if let Some(offset) = self.end_offset {
            cursor = cursor.with_end_offset(offset);
        }

        let tasks: Arc<dyn TaskEnqueuer> = match self.tasks {
            Some(queue) => queue,
            None => Arc::new(MemoryQueue::new()),
        };
        let broadcast = self.broadcast.unwrap_or_else(|| Arc::clone(&tasks));

        Ok(SyncOrchestrator {
            catalog,
            pages,
            details,
            sinks: self.sinks,
            cursor,
            tasks,
            broadcast,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests;
