//! # Ranktrail - Advancement Tracker Server
//!
//! The main binary for the Ranktrail rank advancement tracker.
//!
//! This application provides:
//! - HTTP JSON API server (axum-based, cookie sessions)
//! - CLI interface for setup and quick lookups
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │             apps/ranktrail (THE BINARY)           │
//! │                                                   │
//! │     ┌─────────────┐          ┌─────────────┐      │
//! │     │    CLI      │          │  HTTP API   │      │
//! │     │   (clap)    │          │   (axum)    │      │
//! │     └──────┬──────┘          └──────┬──────┘      │
//! │            └───────────┬────────────┘             │
//! │                        ▼                          │
//! │               ┌────────────────┐                  │
//! │               │ ranktrail-core │                  │
//! │               │  (THE LOGIC)   │                  │
//! │               └────────────────┘                  │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Create a database with the sample curriculum and accounts
//! ranktrail init
//! ranktrail seed
//!
//! # Start the HTTP server
//! ranktrail server --host 0.0.0.0 --port 8080
//!
//! # Quick lookups
//! ranktrail next-steps 4
//! ranktrail eligibility TF-2a --started 2024-02-10
//! ```

use clap::Parser;
use ranktrail::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    // RANKTRAIL_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("RANKTRAIL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ranktrail=info,tower_http=debug".into());

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

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  Ranktrail v{}
  Rank advancement tracker
"#,
        env!("CARGO_PKG_VERSION")
    );
}
