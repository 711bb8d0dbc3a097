//! # Formats Module
//!
//! Byte-level encoding of transform artifact bundles.

mod persistence;

pub use persistence::*;
