//! # lineal
//!
//! Library surface of the Lineal application binary.
//!
//! The binary wires three pieces around `lineal-core`:
//! - `config` - server configuration from a TOML file plus `LINEAL_*` env
//! - `api` - the axum HTTP server exposing the registry and executor
//! - `cli` - clap commands for local inspection and function calls

pub mod api;
pub mod cli;
pub mod config;

use thiserror::Error;

// =============================================================================
// APPLICATION ERRORS
// =============================================================================

/// Errors surfaced by the application layer.
///
/// Core errors pass through unchanged; I/O and configuration problems are
/// app-level concerns the core never sees.
#[derive(Debug, Error)]
pub enum AppError {
    /// An error from the core engine.
    #[error(transparent)]
    Core(#[from] lineal_core::LinealError),

    /// File or network I/O failed.
    #[error("io error: {0}")]
    Io(String),

    /// Configuration file or value was invalid.
    #[error("config error: {0}")]
    Config(String),

    /// A CLI argument could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
