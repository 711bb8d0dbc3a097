//! # Graftwork CLI Module
//!
//! This module implements the CLI interface for Graftwork.
//!
//! ## Available Commands
//!
//! - `inspect` - Show the contract and declarations of a transform artifact
//! - `apply` - Graft an artifact into a host graph
//! - `freeze` - Freeze a host graph and a contract into an artifact
//! - `hash` - Compute the BLAKE3 fingerprint of an artifact

mod commands;

use crate::config::CliConfig;
use clap::{Parser, Subcommand};
use graftwork_core::GraftError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Graftwork - compose persisted transform fragments into live graphs.
///
/// Host graphs are read and written as JSON graph definitions. Bindings are
/// `name=node:0` for dense values and `name=indices:0,values:0,shape:0` for
/// sparse values.
#[derive(Parser, Debug)]
#[command(name = "graftwork")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress informational output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Path to a config file (defaults to ./graftwork.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the contract of a transform artifact
    Inspect {
        /// Artifact directory
        artifact: PathBuf,
    },

    /// Graft a transform artifact into a host graph
    Apply {
        /// Host graph definition (JSON)
        #[arg(short, long)]
        graph: PathBuf,

        /// Artifact directory
        #[arg(short, long)]
        artifact: PathBuf,

        /// Input binding (repeatable)
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Allow unbound inputs and report them
        #[arg(long)]
        partial: bool,

        /// Write the merged host graph here (JSON)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Freeze a host graph and a contract into a transform artifact
    Freeze {
        /// Host graph definition (JSON)
        #[arg(short, long)]
        graph: PathBuf,

        /// Input binding (repeatable)
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Output binding (repeatable)
        #[arg(short, long = "output")]
        outputs: Vec<String>,

        /// Destination directory (must not exist)
        #[arg(short, long)]
        dest: PathBuf,

        /// Write the bundle as JSON instead of binary
        #[arg(long)]
        text: bool,

        /// Asset file to bundle (repeatable)
        #[arg(long = "asset")]
        assets: Vec<PathBuf>,
    },

    /// Compute BLAKE3 fingerprint of an artifact
    Hash {
        /// Artifact directory
        artifact: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments and the resolved config.
pub fn execute(cli: Cli, config: &CliConfig) -> Result<(), GraftError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Inspect { artifact } => cmd_inspect(&artifact, json_mode),
        Commands::Apply {
            graph,
            artifact,
            inputs,
            partial,
            out,
        } => cmd_apply(
            &graph,
            &artifact,
            &inputs,
            partial,
            out.as_deref(),
            json_mode,
        ),
        Commands::Freeze {
            graph,
            inputs,
            outputs,
            dest,
            text,
            assets,
        } => {
            let format = if text {
                graftwork_core::ArtifactFormat::Text
            } else {
                config.artifact_format
            };
            cmd_freeze(
                &graph, &inputs, &outputs, &dest, format, &assets, json_mode,
            )
        }
        Commands::Hash { artifact } => cmd_hash(&artifact, json_mode),
    }
}
