//! CLI module
//!
//! Command-line interface and HTTP trigger server.
//!
//! # Commands
//!
//! - `run` - Run one table's pipeline
//! - `tasks` - Enqueue one run per table of a group
//! - `broadcast` - Publish one message per table
//! - `entities` - List known tables
//! - `serve` - Start the HTTP trigger server

mod commands;
mod runner;
mod server;

pub use commands::{Cli, Commands};
pub use runner::{parse_ids, Runner};
pub use server::{router, serve};
