//! # pawlink
//!
//! The main binary for the pawlink follow graph.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            apps/pawlink (THE BINARY)         │
//! │                                              │
//! │   ┌─────────────┐        ┌─────────────┐     │
//! │   │    CLI      │        │  HTTP API   │     │
//! │   │   (clap)    │        │   (axum)    │     │
//! │   └──────┬──────┘        └──────┬──────┘     │
//! │          └───────────┬──────────┘            │
//! │                      ▼                       │
//! │              ┌───────────────┐               │
//! │              │ pawlink-core  │               │
//! │              │ (THE GRAPH)   │               │
//! │              └───────────────┘               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! pawlink server --host 0.0.0.0 --port 8080
//! pawlink follow --as 1 2
//! pawlink counts 2
//! pawlink export -o graph.pwlk
//! ```

use clap::Parser;
use pawlink::cli;
use pawlink::config::{LogFormat, PawlinkConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match PawlinkConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_tracing(config.log_format);

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pawlink=info,pawlink_core=info,tower_http=debug".into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}

fn print_banner() {
    println!();
    println!("  pawlink v{}", env!("CARGO_PKG_VERSION"));
    println!("  follow graph server");
    println!();
}
