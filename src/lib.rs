// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # caresoft-sync
//!
//! Incremental extraction of Caresoft CRM resources into an analytical
//! warehouse (DuckDB) and an optional relational mirror (Postgres).
//!
//! ## Features
//!
//! - **Three pipeline shapes**: dimensions (truncate), incremental
//!   (append + reconcile) and details (per-id enrichment with deletion markers)
//! - **Stateless resumption**: the next window starts at the greatest cursor
//!   already loaded, so runs need no checkpoint files
//! - **Throttled fan-out**: bounded concurrent page and detail fetches under
//!   token bucket throttles, with retry on 429 and disconnects
//! - **Entities as data**: each resource is a YAML definition, not code
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use caresoft_sync::config::SyncSettings;
//! use caresoft_sync::engine::{SyncOrchestrator, TriggerRequest};
//!
//! #[tokio::main]
//! async fn main() -> caresoft_sync::Result<()> {
//!     let settings = SyncSettings::default().with_env();
//!     let orchestrator = SyncOrchestrator::from_settings(&settings)?;
//!
//!     let response = orchestrator
//!         .handle(&TriggerRequest::table("Tickets"))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   trigger (HTTP / CLI / queued task)
//!                 │
//!        ┌────────┴─────────┐
//!        │ SyncOrchestrator │──── TaskEnqueuer (detail chunks, fan-out)
//!        └────────┬─────────┘
//!   ┌─────────────┼──────────────┬──────────────┐
//!   │ CursorStore │ PageFetcher  │ DetailFetcher│
//!   │ (watermark) │ (numFound)   │ (404 = gone) │
//!   └──────┬──────┴──────┬───────┴──────┬───────┘
//!          │      RateLimitedClient     │
//!          │             │              │
//!          │        Transformer ────────┘
//!          │             │
//!          └──────── Sink(s) ── ReconciliationQuery
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Template interpolation for SQL statements
pub mod template;

/// Throttled HTTP client with retry
pub mod http;

/// Paged listing fetches
pub mod pagination;

/// Per-id detail fetches
pub mod details;

/// Entity definitions and column types
pub mod schema;

/// Projection of raw records onto entity schemas
pub mod transform;

/// Built-in entity catalog
pub mod catalog;

/// Windows and candidates derived from loaded data
pub mod cursor;

/// Destination stores
pub mod sink;

/// Task payloads and queues
pub mod tasks;

/// Pipeline orchestration
pub mod engine;

/// Runtime settings
pub mod config;

/// Command-line interface and trigger server
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use catalog::{Catalog, TaskGroup};
pub use config::SyncSettings;
pub use engine::{PipelineResult, SyncOrchestrator, TriggerRequest, TriggerResponse};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
