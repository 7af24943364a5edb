//! Error types for caresoft-sync
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for caresoft-sync
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid date '{value}': expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("Invalid window: start {start} is after end {end}")]
    InvalidWindow { start: String, end: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded { max_retries: u32 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Source API Errors
    // ============================================================================
    #[error("Response from '{endpoint}' has no '{key}' field")]
    MissingResponseKey { endpoint: String, key: String },

    // ============================================================================
    // Sink Errors
    // ============================================================================
    #[error("Relation {relation} does not exist: {message}")]
    MissingRelation { relation: String, message: String },

    #[error("Sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    #[error("Load into {table} reported {reported} rows but {submitted} were submitted")]
    RowCountMismatch {
        table: String,
        submitted: usize,
        reported: usize,
    },

    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    // ============================================================================
    // Orchestration Errors
    // ============================================================================
    #[error("Unknown entity: {name}")]
    UnknownEntity { name: String },

    #[error("Unknown task group: {group}")]
    UnknownGroup { group: String },

    #[error("Entity '{entity}' does not support {operation}")]
    Unsupported { entity: String, operation: String },

    #[error("Invalid trigger request: {message}")]
    InvalidRequest { message: String },

    #[error("Task enqueue failed: {message}")]
    Task { message: String },

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a missing response key error
    pub fn missing_key(endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingResponseKey {
            endpoint: endpoint.into(),
            key: key.into(),
        }
    }

    /// Create a sink error
    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: message.into(),
        }
    }

    /// Create an unknown entity error
    pub fn unknown_entity(name: impl Into<String>) -> Self {
        Self::UnknownEntity { name: name.into() }
    }

    /// Create an unsupported operation error
    pub fn unsupported(entity: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            entity: entity.into(),
            operation: operation.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a task enqueue error
    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Check if this error is a transient transport failure worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Check if this error means a table or column is absent in the sink
    pub fn is_missing_relation(&self) -> bool {
        matches!(self, Error::MissingRelation { .. })
    }

    /// Check if this error was caused by the caller rather than the system
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnknownEntity { .. }
                | Error::UnknownGroup { .. }
                | Error::InvalidRequest { .. }
                | Error::InvalidDate { .. }
                | Error::InvalidWindow { .. }
                | Error::Unsupported { .. }
        )
    }
}

/// Check if an HTTP status code is a transient upstream failure.
///
/// 500 is excluded: on per-id calls it marks a deleted record.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

/// Result type alias for caresoft-sync
pub type Result<T> = std::result::Result<T, Error>;
