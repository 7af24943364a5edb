//! Cursor module
//!
//! All resumability state lives in the destination tables: the next
//! window starts at the greatest cursor value already loaded, and the
//! details pass picks ids whose detail rows are missing or stale.

mod store;
mod window;

pub use store::{CursorStore, DEFAULT_BOOTSTRAP};
pub use window::{parse_date, Window};
