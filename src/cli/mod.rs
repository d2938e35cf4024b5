//! Operator CLI
//!
//! Commands:
//! - `strategy-runner run` - run the engine as a daemon
//! - `strategy-runner status [id]` - show stored strategies
//! - `strategy-runner activate <id>` / `deactivate <id>` - flip the active flag

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

/// Strategy execution engine
#[derive(Parser, Debug)]
#[command(name = "strategy-runner")]
#[command(author, version, about = "Supervised paper-trading strategy loops")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and per-environment overrides
    #[arg(
        short,
        long,
        global = true,
        default_value = "config",
        env = "STRATEGY_RUNNER_CONFIG_DIR"
    )]
    pub config_dir: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resume active strategies and supervise them until Ctrl+C / SIGTERM
    Run,

    /// Show stored strategies
    Status {
        /// Strategy id (all strategies when omitted)
        id: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mark a strategy active; a running daemon starts it on its next pass
    Activate {
        /// Strategy id
        id: i64,
    },

    /// Mark a strategy inactive; its loop exits at the top of its next cycle
    Deactivate {
        /// Strategy id
        id: i64,
    },
}
