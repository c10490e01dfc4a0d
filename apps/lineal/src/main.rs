//! # Lineal - Versioned Entity Graph Server
//!
//! The main binary for the Lineal entity graph substrate.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for registry inspection and function calls
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                apps/lineal (THE BINARY)              │
//! │                                                      │
//! │   ┌─────────────┐         ┌─────────────┐            │
//! │   │   CLI       │         │   HTTP API  │            │
//! │   │  (clap)     │         │   (axum)    │            │
//! │   └──────┬──────┘         └──────┬──────┘            │
//! │          │                       │                   │
//! │          └───────────┬───────────┘                   │
//! │                      ▼                               │
//! │              ┌───────────────┐                       │
//! │              │  lineal-core  │                       │
//! │              │  (THE LOGIC)  │                       │
//! │              └───────────────┘                       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! lineal server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! lineal status
//! lineal functions
//! lineal call -f raise_gpa -a '{"student": "@12", "amount": 0.5}'
//! ```

use clap::Parser;
use lineal::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — LINEAL_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("LINEAL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lineal=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Lineal startup banner.
fn print_banner() {
    println!(
        r#"
  ██╗     ██╗███╗   ██╗███████╗ █████╗ ██╗
  ██║     ██║████╗  ██║██╔════╝██╔══██╗██║
  ██║     ██║██╔██╗ ██║█████╗  ███████║██║
  ██║     ██║██║╚██╗██║██╔══╝  ██╔══██║██║
  ███████╗██║██║ ╚████║███████╗██║  ██║███████╗
  ╚══════╝╚═╝╚═╝  ╚═══╝╚══════╝╚═╝  ╚═╝╚══════╝

  Versioned Entity Graph Server v{}

  Deterministic • Versioned • Addressable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
