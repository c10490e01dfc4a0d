//! # Lineal CLI Module
//!
//! This module implements the CLI interface for Lineal.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show registry status
//! - `functions` - List registered functions and their shapes
//! - `lineages` - List lineages with latest root ids
//! - `history` - Show the version history of a lineage
//! - `show` - Show one entity by root id and persistent id
//! - `call` - Execute a registered function with JSON arguments
//!
//! Without persistence, non-server commands run against a demo-bootstrapped
//! in-memory engine; they exist for local experimentation and scripting.

mod commands;

use crate::AppError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Lineal - Versioned Entity Graph Server
///
/// A deterministic store of entity trees with lineage tracking, string
/// addresses, and audited function execution.
#[derive(Parser, Debug)]
#[command(name = "lineal")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the server configuration file (TOML)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show registry status
    Status,

    /// List registered functions
    Functions {
        /// Show the declared shapes of one function
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List lineages with their latest root ids
    Lineages,

    /// Show the full version history of a lineage
    History {
        /// Lineage id
        #[arg(short, long)]
        lineage: u64,
    },

    /// Show one entity
    Show {
        /// Root persistent id of the owning tree
        #[arg(short, long)]
        root: u64,

        /// Persistent id of the entity (defaults to the root itself)
        #[arg(short, long)]
        entity: Option<u64>,
    },

    /// Execute a registered function
    Call {
        /// Function name
        #[arg(short, long)]
        function: String,

        /// Arguments as a JSON object, e.g. '{"student": "@12", "amount": 0.5}'
        #[arg(short, long, default_value = "{}")]
        args: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let config_path = cli.config.as_deref();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(config_path, host.as_deref(), port).await
        }
        Some(Commands::Status) => cmd_status(json_mode),
        Some(Commands::Functions { name }) => cmd_functions(json_mode, name.as_deref()),
        Some(Commands::Lineages) => cmd_lineages(json_mode),
        Some(Commands::History { lineage }) => cmd_history(json_mode, lineage),
        Some(Commands::Show { root, entity }) => cmd_show(json_mode, root, entity),
        Some(Commands::Call { function, args }) => cmd_call(json_mode, &function, &args),
        None => {
            // No subcommand - show status by default
            cmd_status(json_mode)
        }
    }
}
