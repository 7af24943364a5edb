//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Caresoft CRM incremental sync
#[derive(Parser, Debug)]
#[command(name = "caresoft-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML); environment variables override it
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline of one table
    Run {
        /// Table name (e.g. Tickets, TicketsDetails, Agents)
        #[arg(short, long)]
        table: String,

        /// Window start, YYYY-MM-DD (requires --end)
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Window end, YYYY-MM-DD (requires --start)
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Explicit ids for a details table (comma-separated)
        #[arg(long)]
        ids: Option<String>,
    },

    /// Enqueue one run per table of a group
    Tasks {
        /// Group: static, incre or all
        #[arg(default_value = "all")]
        group: String,

        #[arg(long, requires = "end")]
        start: Option<String>,

        #[arg(long, requires = "start")]
        end: Option<String>,
    },

    /// Publish one message per table
    Broadcast,

    /// List known tables
    Entities,

    /// Start the HTTP trigger server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}
