//! Throttled, retrying HTTP client for the source API
//!
//! Handles:
//! - Bearer credential and JSON content headers on every call
//! - Token bucket throttling before every attempt
//! - Transparent retry on 429 after a short fixed backoff
//! - Retry on disconnects and gateway errors up to a fixed ceiling
//! - Classification of 404/500 on per-id calls as "gone"

use super::rate_limit::{Throttle, ThrottleConfig};
use crate::error::{Error, Result};
use crate::types::{BackoffType, JsonValue};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the rate limited client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for all requests
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum retries after a disconnect or gateway error
    pub max_retries: u32,
    /// Maximum retries after a 429
    pub max_rate_limited_retries: u32,
    /// Fixed sleep after a 429
    pub rate_limit_backoff: Duration,
    /// Initial delay for disconnect backoff
    pub initial_backoff: Duration,
    /// Maximum delay for disconnect backoff
    pub max_backoff: Duration,
    /// Type of disconnect backoff
    pub backoff_type: BackoffType,
    /// Throttle configuration
    pub throttle: Option<ThrottleConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut default_headers = HashMap::new();
        default_headers.insert("Content-Type".to_string(), "application/json".to_string());

        Self {
            base_url: None,
            timeout: Duration::from_secs(540),
            max_retries: 4,
            max_rate_limited_retries: 20,
            rate_limit_backoff: Duration::from_millis(500),
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
            backoff_type: BackoffType::Exponential,
            throttle: Some(ThrottleConfig::default()),
            default_headers,
            user_agent: format!("caresoft-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for client config
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the disconnect retry ceiling
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the 429 retry ceiling and the fixed sleep between attempts
    pub fn rate_limit_retry(mut self, retries: u32, backoff: Duration) -> Self {
        self.config.max_rate_limited_retries = retries;
        self.config.rate_limit_backoff = backoff;
        self
    }

    /// Set disconnect backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set the throttle
    pub fn throttle(mut self, config: ThrottleConfig) -> Self {
        self.config.throttle = Some(config);
        self
    }

    /// Disable throttling
    pub fn no_throttle(mut self) -> Self {
        self.config.throttle = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Attach a bearer credential to every request
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.header("Authorization", value)
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

/// Outcome of a per-id fetch
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The record exists; the full JSON body
    Found(JsonValue),
    /// The source answered 404 or 500 for this id
    Gone {
        /// Status code that classified the id as gone
        status: u16,
    },
}

/// How non-success statuses are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusPolicy {
    /// Every non-success status is an error
    Strict,
    /// 404 and 500 mean the id no longer exists
    DetailLookup,
}

/// Throttled HTTP client with retry on rate limits and disconnects
pub struct RateLimitedClient {
    client: Client,
    config: ClientConfig,
    throttle: Option<Throttle>,
}

impl RateLimitedClient {
    /// Create a client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let throttle = config.throttle.as_ref().map(Throttle::new);

        Ok(Self {
            client,
            config,
            throttle,
        })
    }

    /// Fetch a JSON body; any non-success status is an error
    pub async fn fetch(&self, path: &str, query: &[(String, String)]) -> Result<JsonValue> {
        match self.execute(path, query, StatusPolicy::Strict).await? {
            FetchOutcome::Found(body) => Ok(body),
            FetchOutcome::Gone { status } => Err(Error::http_status(status, String::new())),
        }
    }

    /// Fetch a single record by path, classifying 404/500 as gone
    pub async fn fetch_detail(&self, path: &str) -> Result<FetchOutcome> {
        self.execute(path, &[], StatusPolicy::DetailLookup).await
    }

    async fn execute(
        &self,
        path: &str,
        query: &[(String, String)],
        policy: StatusPolicy,
    ) -> Result<FetchOutcome> {
        let full_url = self.build_url(path);
        let max_retries = self.config.max_retries;
        let max_rate_limited = self.config.max_rate_limited_retries;

        let mut transient_attempts = 0;
        let mut rate_limited_attempts = 0;

        loop {
            if let Some(ref throttle) = self.throttle {
                throttle.wait().await;
            }

            let mut req = self.client.get(&full_url);
            for (key, value) in &self.config.default_headers {
                req = req.header(key.as_str(), value.as_str());
            }
            if !query.is_empty() {
                req = req.query(query);
            }

            let failure = match req.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if rate_limited_attempts < max_rate_limited {
                            rate_limited_attempts += 1;
                            debug!(
                                "Rate limited (429) on {}, attempt {}/{}, sleeping {:?}",
                                full_url,
                                rate_limited_attempts,
                                max_rate_limited,
                                self.config.rate_limit_backoff
                            );
                            tokio::time::sleep(self.config.rate_limit_backoff).await;
                            continue;
                        }
                        return Err(Error::RateLimited {
                            attempts: rate_limited_attempts + 1,
                        });
                    }

                    if policy == StatusPolicy::DetailLookup
                        && matches!(status.as_u16(), 404 | 500)
                    {
                        debug!("{} answered {}, treating as gone", full_url, status);
                        return Ok(FetchOutcome::Gone {
                            status: status.as_u16(),
                        });
                    }

                    if status.is_success() {
                        match response.json::<JsonValue>().await {
                            Ok(body) => {
                                debug!("Request succeeded: GET {}", full_url);
                                return Ok(FetchOutcome::Found(body));
                            }
                            Err(e) if e.is_decode() => return Err(Error::Http(e)),
                            Err(e) => Error::Http(e),
                        }
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        let err = Error::http_status(status.as_u16(), body);
                        if !err.is_retryable() {
                            return Err(err);
                        }
                        err
                    }
                }
                Err(e) if e.is_timeout() => Error::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                },
                Err(e) => {
                    let err = Error::Http(e);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    err
                }
            };

            if transient_attempts >= max_retries {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    full_url,
                    transient_attempts + 1,
                    failure
                );
                return Err(failure);
            }

            let delay = self.calculate_backoff(transient_attempts);
            transient_attempts += 1;
            warn!(
                "Transient failure on {} ({}), attempt {}/{}, retrying in {:?}",
                full_url,
                failure,
                transient_attempts,
                max_retries + 1,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Build full URL from path
    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        }
    }

    /// Calculate disconnect backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.config.backoff_type {
            BackoffType::Constant => self.config.initial_backoff,
            BackoffType::Linear => self.config.initial_backoff * (attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.config.initial_backoff * factor
            }
        };

        std::cmp::min(delay, self.config.max_backoff)
    }
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("base_url", &self.config.base_url)
            .field("max_retries", &self.config.max_retries)
            .field("has_throttle", &self.throttle.is_some())
            .finish_non_exhaustive()
    }
}
