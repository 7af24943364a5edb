//! Pagination types
//!
//! Query parameters for windowed listing calls and the page arithmetic
//! driven by the `numFound` total in the first response.

use crate::cursor::Window;
use crate::error::{Error, Result};
use crate::types::{JsonValue, Query};
use serde::{Deserialize, Serialize};

/// Response key carrying the total number of matching records
pub const NUM_FOUND_KEY: &str = "numFound";

/// Query parameter selecting the 1-based page
pub const PAGE_PARAM: &str = "page";

/// Query parameter selecting the page size
pub const COUNT_PARAM: &str = "count";

/// How a listing endpoint is filtered by time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowParams {
    /// `updated_since` / `updated_to`, ordered by `updated_at`
    Updated,
    /// `start_time_since` / `start_time_to`, ordered by `start_time`
    StartTime,
}

impl WindowParams {
    fn keys(self) -> (&'static str, &'static str, &'static str) {
        match self {
            WindowParams::Updated => ("updated_since", "updated_to", "updated_at"),
            WindowParams::StartTime => ("start_time_since", "start_time_to", "start_time"),
        }
    }

    /// Build the listing query for a window, without the page number
    pub fn query(self, window: &Window, page_size: u32) -> Query {
        let (since, to, order_by) = self.keys();
        vec![
            (since.to_string(), window.start_param()),
            (to.to_string(), window.end_param()),
            ("order_by".to_string(), order_by.to_string()),
            ("order_type".to_string(), "asc".to_string()),
            (COUNT_PARAM.to_string(), page_size.to_string()),
        ]
    }
}

/// Number of pages needed to cover `num_found` records
pub fn page_count(num_found: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    num_found.div_ceil(u64::from(page_size))
}

/// Read `numFound` from a listing response; the API sends a number or a string
pub fn num_found(body: &JsonValue, endpoint: &str) -> Result<u64> {
    match body.get(NUM_FOUND_KEY) {
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .ok_or_else(|| Error::missing_key(endpoint, NUM_FOUND_KEY)),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| Error::missing_key(endpoint, NUM_FOUND_KEY)),
        Some(JsonValue::Null) => Ok(0),
        _ => Err(Error::missing_key(endpoint, NUM_FOUND_KEY)),
    }
}

/// Take the row array out of a response body
pub fn take_rows(mut body: JsonValue, endpoint: &str, row_key: &str) -> Result<Vec<JsonValue>> {
    match body.get_mut(row_key).map(JsonValue::take) {
        Some(JsonValue::Array(rows)) => Ok(rows),
        Some(JsonValue::Null) => Ok(Vec::new()),
        _ => Err(Error::missing_key(endpoint, row_key)),
    }
}
