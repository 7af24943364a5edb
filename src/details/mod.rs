//! Details module
//!
//! Per-id enrichment: one request per id, fully concurrent under the
//! detail throttle. Ids the source answers 404 or 500 for are reported
//! as deleted instead of failing the batch.

mod fetcher;

pub use fetcher::{DeletionMarker, DetailBatch, DetailFetcher, DEFAULT_DETAIL_CONCURRENCY};
