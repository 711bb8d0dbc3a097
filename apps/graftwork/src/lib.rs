//! # Graftwork - Command-Line Application
//!
//! Library half of the `graftwork` binary, split out so the command layer
//! and config loading can be tested directly.

pub mod cli;
pub mod config;
