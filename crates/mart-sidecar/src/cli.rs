use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mart")]
#[command(about = "Shosha Mart branch replica: local POS API and upstream sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the local store (overrides POS_DB_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Upstream base URL (overrides POS_UPSTREAM_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub upstream: Option<String>,

    /// Branch id of this replica (overrides POS_BRANCH_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub branch_id: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the local API and run the background sync worker (default)
    Serve {
        /// Listen address (overrides POS_BIND_ADDR)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Run one sync cycle against upstream and exit
    Sync {
        /// Cancel the cycle after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Show queued changes and the last sync watermark
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Hard-delete tombstones that upstream already acknowledged
    Prune,
    /// List recent sync conflicts
    Conflicts {
        /// Number of conflicts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
