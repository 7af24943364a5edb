//! Runtime settings
//!
//! Loaded from an optional YAML file, then overridden from environment
//! variables. Every field has a default, so an empty file is valid.

use crate::cursor::{parse_date, DEFAULT_BOOTSTRAP};
use crate::error::{Error, Result};
use crate::http::{ClientConfig, ThrottleConfig};
use crate::types::{BackoffType, OptionStringExt};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Environment Variables
// ============================================================================

pub const ENV_BASE_URL: &str = "CARESOFT_BASE_URL";
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const ENV_DATASET: &str = "DATASET";
pub const ENV_WAREHOUSE_PATH: &str = "WAREHOUSE_PATH";
pub const ENV_DATABASE_URL: &str = "PG_URL";
pub const ENV_DATABASE_SCHEMA: &str = "PG_SCHEMA";
pub const ENV_TASKS_URL: &str = "TASKS_URL";
pub const ENV_BROADCAST_URL: &str = "BROADCAST_URL";
pub const ENV_TASKS_TOKEN: &str = "TASKS_TOKEN";

// ============================================================================
// Settings
// ============================================================================

/// Everything a sync run needs to know about its environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Source API base URL
    pub base_url: String,

    /// Bearer credential for the source API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Destination schema in the warehouse
    pub dataset: String,

    /// DuckDB warehouse file, or `:memory:`
    pub warehouse_path: String,

    /// Postgres URL of the relational mirror
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Destination schema in the relational mirror
    pub database_schema: String,

    /// Endpoint receiving queued runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_url: Option<String>,

    /// Endpoint receiving broadcast messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast_url: Option<String>,

    /// Bearer credential for the task and broadcast endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks_token: Option<String>,

    /// Records per listing page
    pub page_size: u32,

    /// Maximum detail candidates per details run
    pub details_limit: usize,

    /// Maximum ids per queued detail task
    pub detail_batch_size: usize,

    pub listing_rps: u32,
    pub detail_rps: u32,

    /// Requests in flight per fetcher
    pub concurrency: usize,

    /// Retries after a disconnect or gateway error
    pub max_retries: u32,

    /// Retries after a 429
    pub max_rate_limited_retries: u32,

    pub rate_limit_backoff_ms: u64,
    pub timeout_secs: u64,

    /// Window start for a table that has never been loaded (`YYYY-MM-DD`)
    pub bootstrap_start: String,

    /// Offset of the source's clock from UTC, applied to computed window ends
    pub source_utc_offset_hours: i64,

    /// Extra entity definitions (YAML list) merged over the built-ins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities_file: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.caresoft.vn/VUANEM/api/v1".to_string(),
            access_token: None,
            dataset: "Caresoft".to_string(),
            warehouse_path: "caresoft.duckdb".to_string(),
            database_url: None,
            database_schema: "public".to_string(),
            tasks_url: None,
            broadcast_url: None,
            tasks_token: None,
            page_size: 500,
            details_limit: 2500,
            detail_batch_size: 2500,
            listing_rps: 15,
            detail_rps: 50,
            concurrency: 50,
            max_retries: 4,
            max_rate_limited_retries: 20,
            rate_limit_backoff_ms: 500,
            timeout_secs: 540,
            bootstrap_start: DEFAULT_BOOTSTRAP.to_string(),
            source_utc_offset_hours: 7,
            entities_file: None,
        }
    }
}

impl SyncSettings {
    /// Parse settings from YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load settings from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_yaml_str(&content)
    }

    /// Override fields from the process environment
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary variable lookup
    #[must_use]
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).none_if_empty();

        if let Some(v) = get(ENV_BASE_URL) {
            self.base_url = v;
        }
        if let Some(v) = get(ENV_ACCESS_TOKEN) {
            self.access_token = Some(v);
        }
        if let Some(v) = get(ENV_DATASET) {
            self.dataset = v;
        }
        if let Some(v) = get(ENV_WAREHOUSE_PATH) {
            self.warehouse_path = v;
        }
        if let Some(v) = get(ENV_DATABASE_URL) {
            self.database_url = Some(v);
        }
        if let Some(v) = get(ENV_DATABASE_SCHEMA) {
            self.database_schema = v;
        }
        if let Some(v) = get(ENV_TASKS_URL) {
            self.tasks_url = Some(v);
        }
        if let Some(v) = get(ENV_BROADCAST_URL) {
            self.broadcast_url = Some(v);
        }
        if let Some(v) = get(ENV_TASKS_TOKEN) {
            self.tasks_token = Some(v);
        }
        self
    }

    /// Check values that would make a run misbehave
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::invalid_value("base_url", e.to_string()))?;

        for (field, url) in [
            ("tasks_url", &self.tasks_url),
            ("broadcast_url", &self.broadcast_url),
        ] {
            if let Some(url) = url {
                url::Url::parse(url).map_err(|e| Error::invalid_value(field, e.to_string()))?;
            }
        }

        let positive = [
            ("page_size", u64::from(self.page_size)),
            ("details_limit", self.details_limit as u64),
            ("detail_batch_size", self.detail_batch_size as u64),
            ("listing_rps", u64::from(self.listing_rps)),
            ("detail_rps", u64::from(self.detail_rps)),
            ("concurrency", self.concurrency as u64),
            ("timeout_secs", self.timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(Error::invalid_value(field, "must be greater than zero"));
            }
        }

        if self.dataset.trim().is_empty() {
            return Err(Error::MissingConfigField {
                field: "dataset".to_string(),
            });
        }

        self.bootstrap()?;
        Ok(())
    }

    /// Parsed bootstrap window start
    pub fn bootstrap(&self) -> Result<DateTime<Utc>> {
        parse_date(&self.bootstrap_start)
    }

    pub fn source_utc_offset(&self) -> ChronoDuration {
        ChronoDuration::hours(self.source_utc_offset_hours)
    }

    /// Client config for paginated listing calls
    pub fn listing_client_config(&self) -> ClientConfig {
        self.client_config(ThrottleConfig::per_second(self.listing_rps))
    }

    /// Client config for per-id detail calls
    pub fn detail_client_config(&self) -> ClientConfig {
        self.client_config(ThrottleConfig::per_second(self.detail_rps))
    }

    fn client_config(&self, throttle: ThrottleConfig) -> ClientConfig {
        let mut builder = ClientConfig::builder()
            .base_url(&self.base_url)
            .timeout(Duration::from_secs(self.timeout_secs))
            .max_retries(self.max_retries)
            .rate_limit_retry(
                self.max_rate_limited_retries,
                Duration::from_millis(self.rate_limit_backoff_ms),
            )
            .backoff(
                BackoffType::Exponential,
                Duration::from_millis(250),
                Duration::from_secs(10),
            )
            .throttle(throttle);

        if let Some(ref token) = self.access_token {
            builder = builder.bearer_token(token);
        }
        builder.build()
    }
}
