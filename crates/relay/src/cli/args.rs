use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run human-in-the-loop workflows and serve them over HTTP.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Path to the configuration file (defaults to ~/.relay/config.toml)
    #[arg(long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the run database file (overrides the [store] section)
    #[arg(long, env = "RELAY_RUN_DB", hide = true)]
    pub run_db: Option<PathBuf>,

    /// Directory for log files; logs go to stderr when unset
    #[arg(long, env = "RELAY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides the [server] section)
        #[arg(long)]
        port: Option<u16>,

        /// Bind address (overrides the [server] section)
        #[arg(long)]
        bind: Option<String>,

        /// Keep runs in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// List the workflows this host can run
    Workflows,
    /// Inspect stored runs
    Runs {
        #[command(subcommand)]
        runs_command: RunsCommands,
    },
    /// Configuration file commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum RunsCommands {
    /// List stored runs, newest first
    List {
        /// Limit number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show a run's transcript with questions paired to their answers
    Show {
        /// Run ID to show
        run_id: String,
    },
    /// Delete a run and its journal
    Delete {
        /// Run ID to delete
        run_id: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write the default configuration file if none exists
    Init,
}
