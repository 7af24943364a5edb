//! Pagination module
//!
//! The source API paginates with `page`/`count` and reports the total in
//! `numFound`. Listing calls are filtered by a time window whose parameter
//! names depend on the resource.

mod fetcher;
mod types;

pub use fetcher::{PageFetcher, DEFAULT_PAGE_CONCURRENCY};
pub use types::{
    num_found, page_count, take_rows, WindowParams, COUNT_PARAM, NUM_FOUND_KEY, PAGE_PARAM,
};

#[cfg(test)]
mod tests;
