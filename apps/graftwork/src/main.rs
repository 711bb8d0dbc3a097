//! # Graftwork
//!
//! Command-line front end for the graftwork-core composition engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              apps/graftwork (THE BINARY)             │
//! │                                                      │
//! │   ┌─────────────┐            ┌──────────────────┐    │
//! │   │    CLI      │            │   Config + Logs  │    │
//! │   │   (clap)    │            │ (toml, tracing)  │    │
//! │   └──────┬──────┘            └────────┬─────────┘    │
//! │          └──────────────┬─────────────┘              │
//! │                         ▼                            │
//! │                ┌─────────────────┐                   │
//! │                │ graftwork-core  │                   │
//! │                │ (THE PROTOCOL)  │                   │
//! │                └─────────────────┘                   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! graftwork freeze -g host.json -i raw=x:0 -o scaled=scale:0 -d transform_fn
//! graftwork inspect transform_fn
//! graftwork apply -g serving.json -a transform_fn -i raw=input:0 --out merged.json
//! graftwork hash transform_fn
//! ```

use clap::Parser;
use graftwork::cli;
use graftwork::config::{CliConfig, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    let config = match CliConfig::resolve(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_tracing(&config, cli.verbose, cli.quiet);

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the config filter.
fn init_tracing(config: &CliConfig, verbose: bool, quiet: bool) {
    let default_filter = if verbose {
        "graftwork=debug,graftwork_core=debug".to_string()
    } else if quiet {
        "graftwork=warn,graftwork_core=warn".to_string()
    } else {
        config.log_filter.clone()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
