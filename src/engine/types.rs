//! Engine types
//!
//! Trigger bodies, per-pipeline results and run configuration.

use crate::catalog::TaskGroup;
use crate::cursor::Window;
use crate::error::{Error, Result};
use crate::sink::LoadResult;
use crate::types::{EntityId, JsonValue};
use serde::{Deserialize, Serialize};

/// Value of `pipelines` in every trigger response
pub const PIPELINES_NAME: &str = "Caresoft";

/// Body accepted by the trigger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Window start, `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    /// Window end, `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    /// Explicit ids for a details run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<EntityId>,

    /// `true` or a group name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<bool>,
}

/// What a trigger body asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Run one table's pipeline
    Run {
        table: String,
        start: Option<String>,
        end: Option<String>,
        ids: Vec<EntityId>,
    },
    /// Enqueue one run per entity of a group
    Tasks {
        group: TaskGroup,
        start: Option<String>,
        end: Option<String>,
    },
    /// Publish one message per entity
    Broadcast,
}

impl TriggerRequest {
    /// Request running a single table
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_window(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self.end = Some(end.into());
        self
    }

    #[must_use]
    pub fn with_ids(mut self, ids: Vec<EntityId>) -> Self {
        self.ids = ids;
        self
    }

    /// Decide what the body asks for. `broadcast` wins over `tasks`,
    /// which wins over `table`.
    pub fn action(&self) -> Result<Trigger> {
        if self.broadcast == Some(true) {
            return Ok(Trigger::Broadcast);
        }

        if let Some(tasks) = &self.tasks {
            let group = match tasks {
                JsonValue::Bool(true) => TaskGroup::All,
                JsonValue::String(name) => name.parse()?,
                other => {
                    return Err(Error::invalid_request(format!(
                        "tasks must be true or a group name, got {other}"
                    )))
                }
            };
            return Ok(Trigger::Tasks {
                group,
                start: self.start.clone(),
                end: self.end.clone(),
            });
        }

        match &self.table {
            Some(table) => Ok(Trigger::Run {
                table: table.clone(),
                start: self.start.clone(),
                end: self.end.clone(),
                ids: self.ids.clone(),
            }),
            None => Err(Error::invalid_request(
                "request needs one of table, tasks or broadcast",
            )),
        }
    }
}

/// Outcome of one pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub table: String,

    /// Rows fetched from the source
    pub num_processed: usize,

    /// Rows the primary sink reports as written; absent when nothing was loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_rows: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loads: Vec<LoadResult>,

    /// Detail tasks enqueued after the load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks_created: Option<usize>,

    /// Non-fatal failures (secondary sinks, follow-up enqueue)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl PipelineResult {
    pub fn new(table: impl Into<String>, num_processed: usize) -> Self {
        Self {
            table: table.into(),
            num_processed,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: &Window) -> Self {
        self.start = Some(window.start_param());
        self.end = Some(window.end_param());
        self
    }
}

/// Outcome of a fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutResult {
    /// Runs enqueued on the sync queue
    Tasks(usize),
    /// Messages published to the broadcast topic
    MessageSent(usize),
}

/// Result of one trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunResult {
    /// Dimension and incremental runs
    Single(PipelineResult),
    /// Details runs: details stage, then deletion markers
    Stages(Vec<PipelineResult>),
    Fanout(FanoutResult),
}

impl RunResult {
    /// Every pipeline stage in this result
    pub fn stages(&self) -> Vec<&PipelineResult> {
        match self {
            RunResult::Single(result) => vec![result],
            RunResult::Stages(results) => results.iter().collect(),
            RunResult::Fanout(_) => Vec::new(),
        }
    }
}

/// Response body of the trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub pipelines: String,
    pub results: RunResult,
}

impl TriggerResponse {
    pub fn new(results: RunResult) -> Self {
        Self {
            pipelines: PIPELINES_NAME.to_string(),
            results,
        }
    }
}

/// Tunables of the pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Maximum detail candidates per details run
    pub details_limit: usize,
    /// Maximum ids per queued detail task
    pub detail_batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            details_limit: 2500,
            detail_batch_size: 2500,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_details_limit(mut self, limit: usize) -> Self {
        self.details_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_detail_batch_size(mut self, size: usize) -> Self {
        self.detail_batch_size = size.max(1);
        self
    }
}
