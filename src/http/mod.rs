//! HTTP client module
//!
//! Provides the throttled client every source API call goes through.
//!
//! # Features
//!
//! - **Throttling**: Token bucket limiter using governor, one per client
//! - **Rate Limit Retries**: 429 responses are retried after a fixed sleep
//! - **Transport Retries**: Disconnects and gateway errors with backoff
//! - **Detail Lookups**: 404/500 on per-id calls classified as gone

mod client;
mod rate_limit;

pub use client::{ClientConfig, ClientConfigBuilder, FetchOutcome, RateLimitedClient};
pub use rate_limit::{Throttle, ThrottleConfig};
