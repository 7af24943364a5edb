//! Task payloads and enqueuers

use crate::error::{Error, Result};
use crate::types::EntityId;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// Queue receiving one run per table
pub const SYNC_QUEUE: &str = "caresoft";

/// Queue receiving detail-id chunks
pub const DETAILS_QUEUE: &str = "caresoft-details";

/// Topic receiving broadcast messages
pub const BROADCAST_QUEUE: &str = "caresoft-broadcast";

/// Body of a queued run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<EntityId>,
}

impl TaskPayload {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            start: None,
            end: None,
            ids: Vec::new(),
        }
    }

    /// Run over an explicit window
    #[must_use]
    pub fn with_window(mut self, start: Option<String>, end: Option<String>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    #[must_use]
    pub fn with_ids(mut self, ids: Vec<EntityId>) -> Self {
        self.ids = ids;
        self
    }
}

/// Split ids into detail tasks of at most `batch_size` ids each
pub fn chunk_detail_tasks(table: &str, ids: &[EntityId], batch_size: usize) -> Vec<TaskPayload> {
    ids.chunks(batch_size.max(1))
        .map(|chunk| TaskPayload::table(table).with_ids(chunk.to_vec()))
        .collect()
}

/// Something that accepts task payloads for later execution
#[async_trait]
pub trait TaskEnqueuer: Send + Sync {
    /// Enqueue `tasks` on `queue`, returning how many were accepted
    async fn enqueue(&self, queue: &str, tasks: Vec<TaskPayload>) -> Result<usize>;
}

/// Enqueuer posting each payload as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpTaskQueue {
    client: Client,
    url: String,
    bearer_token: Option<String>,
    concurrency: usize,
}

impl HttpTaskQueue {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let url = url.into();
        url::Url::parse(&url)?;

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            bearer_token: None,
            concurrency: 8,
        })
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    async fn post(&self, queue: &str, task: &TaskPayload) -> Result<()> {
        let mut req = self
            .client
            .post(&self.url)
            .header("X-Task-Queue", queue)
            .json(task);
        if let Some(ref token) = self.bearer_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::task(format!(
                "{} rejected task for {} with {}: {}",
                self.url, task.table, status, body
            )));
        }
        debug!("Enqueued {} on {}", task.table, queue);
        Ok(())
    }
}

#[async_trait]
impl TaskEnqueuer for HttpTaskQueue {
    async fn enqueue(&self, queue: &str, tasks: Vec<TaskPayload>) -> Result<usize> {
        let count = tasks.len();
        let posts: Vec<_> = tasks.iter().map(|task| self.post(queue, task)).collect();
        stream::iter(posts)
            .buffer_unordered(self.concurrency)
            .try_collect::<Vec<()>>()
            .await?;

        info!("Enqueued {} task(s) on {}", count, queue);
        Ok(count)
    }
}

/// Enqueuer that records payloads in memory.
///
/// Used when no queue endpoint is configured, and in tests.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    tasks: Mutex<Vec<(String, TaskPayload)>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything enqueued so far, with its queue name
    pub fn tasks(&self) -> Vec<(String, TaskPayload)> {
        self.tasks
            .lock()
            .map(|tasks| tasks.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|tasks| tasks.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskEnqueuer for MemoryQueue {
    async fn enqueue(&self, queue: &str, tasks: Vec<TaskPayload>) -> Result<usize> {
        let count = tasks.len();
        let mut stored = self
            .tasks
            .lock()
            .map_err(|_| Error::task("memory queue lock poisoned"))?;
        stored.extend(tasks.into_iter().map(|t| (queue.to_string(), t)));
        Ok(count)
    }
}
