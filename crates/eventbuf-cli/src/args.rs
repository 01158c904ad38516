//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eventbuf_store::EventId;

/// Inspect and operate a durable event buffer
#[derive(Parser, Debug)]
#[command(name = "eventbuf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, env = "EVENTBUF_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add one event and print its id
    Add {
        /// Event payload, stored as UTF-8 bytes
        payload: String,
    },

    /// Mark the oldest ready events pending and print them as JSON lines
    Take {
        /// Maximum events to take (defaults to upload.batch_size)
        max: Option<usize>,
    },

    /// Delete delivered events
    Purge {
        /// Ids returned by a previous take
        #[arg(required = true)]
        ids: Vec<EventId>,
    },

    /// Return pending events to the ready queue
    Abandon {
        #[arg(required = true)]
        ids: Vec<EventId>,
    },

    /// Reset pending events left by a crashed uploader
    Recover {
        /// Only reset events pending for at least this many seconds
        #[arg(long)]
        stale_secs: Option<u64>,
    },

    /// Print event counts per state as JSON
    Stats,
}
