//! Full-resource page fetcher

use super::types::{num_found, page_count, take_rows, PAGE_PARAM};
use crate::error::Result;
use crate::http::RateLimitedClient;
use crate::types::{JsonValue, Query};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of pages in flight at once
pub const DEFAULT_PAGE_CONCURRENCY: usize = 50;

/// Fetches every page of a listing endpoint.
///
/// The first page tells how many records match; the rest are requested
/// concurrently, bounded by the client's throttle and `concurrency`.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Arc<RateLimitedClient>,
    page_size: u32,
    concurrency: usize,
}

impl PageFetcher {
    pub fn new(client: Arc<RateLimitedClient>, page_size: u32) -> Self {
        Self {
            client,
            page_size,
            concurrency: DEFAULT_PAGE_CONCURRENCY,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch a small resource returned whole by a single call
    pub async fn fetch_unpaged(&self, endpoint: &str, row_key: &str) -> Result<Vec<JsonValue>> {
        let body = self.client.fetch(endpoint, &[]).await?;
        let rows = take_rows(body, endpoint, row_key)?;
        debug!("Fetched {} rows from {}", rows.len(), endpoint);
        Ok(rows)
    }

    /// Fetch every page matching `params`; row order across pages is not kept
    pub async fn fetch_all(
        &self,
        endpoint: &str,
        row_key: &str,
        params: &Query,
    ) -> Result<Vec<JsonValue>> {
        let first = self.client.fetch(endpoint, &with_page(params, 1)).await?;
        let total = num_found(&first, endpoint)?;
        let pages = page_count(total, self.page_size);

        info!(
            "{}: numFound={}, {} page(s) of {}",
            endpoint, total, pages, self.page_size
        );

        if pages == 0 {
            return Ok(Vec::new());
        }

        let mut rows = take_rows(first, endpoint, row_key)?;
        if pages == 1 {
            return Ok(rows);
        }

        let requests: Vec<_> = (2..=pages)
            .map(|page| self.fetch_page(endpoint, row_key, params, page))
            .collect();
        let rest: Vec<Vec<JsonValue>> = stream::iter(requests)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        for page_rows in rest {
            rows.extend(page_rows);
        }

        debug!("Fetched {} rows from {}", rows.len(), endpoint);
        Ok(rows)
    }

    async fn fetch_page(
        &self,
        endpoint: &str,
        row_key: &str,
        params: &Query,
        page: u64,
    ) -> Result<Vec<JsonValue>> {
        let body = self.client.fetch(endpoint, &with_page(params, page)).await?;
        take_rows(body, endpoint, row_key)
    }
}

fn with_page(params: &Query, page: u64) -> Query {
    let mut query = params.clone();
    query.push((PAGE_PARAM.to_string(), page.to_string()));
    query
}
