//! CLI command parsing.

use clap::{Parser, Subcommand};

/// pairline - HTTP session backend for a streaming AI pair-programming agent.
#[derive(Parser)]
#[command(name = "pairline")]
#[command(about = "Session backend for a streaming AI pair-programming agent")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server (the default).
    Serve {
        /// Host to bind to (overrides config).
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config).
        #[arg(short, long)]
        port: Option<u16>,

        /// Project directory to bind at startup.
        #[arg(short = 'd', long, conflicts_with = "defer")]
        project: Option<std::path::PathBuf>,

        /// Wait for a client to call `initialize_project`.
        #[arg(long)]
        defer: bool,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect persisted sessions.
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration.
    Show,

    /// Show the configuration file path.
    Path,

    /// Generate a new API token for remote access.
    GenerateToken,
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// List persisted sessions, newest first.
    List {
        /// Output format (table or json).
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Limit number of sessions shown.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print a session's transcript.
    Show {
        /// Session ID.
        session_id: String,

        /// Output format (text or json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete a persisted session.
    Delete {
        /// Session ID.
        session_id: String,
    },
}
