//! # graftwork-core
//!
//! The deterministic graph-composition engine for Graftwork - THE PROTOCOL.
//!
//! This crate grafts persisted transform fragments into a live host graph by
//! logical name, and freezes live graphs back into transform artifacts.
//!
//! ## Pipeline
//!
//! ```text
//! logical inputs ──▶ codec::flatten ──▶ signature check ──▶ import under scope
//!                                                               │
//! logical outputs ◀── codec::unflatten ◀── resolve outputs / unbound inputs
//! ```
//!
//! ## Architectural Constraints
//!
//! - Graph construction only: nothing here executes a graph
//! - The host graph is owned by the caller's `Session`; composition only appends
//! - Imported fragments are stateless: declared variables are reported, never restored
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod artifact;
pub mod codec;
pub mod compositor;
pub mod formats;
pub mod graph;
pub mod primitives;
pub mod session;
pub mod signature;
pub mod types;
pub mod writer;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    DType, GraftError, Identifier, ImportWarning, LogicalValue, Shape, SparseValue, TensorRef,
    TensorSpec,
};

// =============================================================================
// RE-EXPORTS: Protocol
// =============================================================================

pub use artifact::{ArtifactFormat, MetaGraph, SavedArtifact, SignatureDef, TensorInfo};
pub use codec::{FlatKey, FlatMap, LogicalMap, Suffix, flatten, unflatten};
pub use compositor::{Compositor, PartialApplication};
pub use graph::{Graph, GraphBuilder, GraphDef, NodeDef, SubstitutionMap};
pub use session::{ScopeAllocator, Session};
pub use signature::{LoadedTransform, Signature, build_signature_def, load_input_output_signature};
pub use writer::ArtifactWriter;

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{PersistenceHeader, artifact_from_bytes, artifact_to_bytes};

#[cfg(feature = "crypto-hash")]
pub use formats::artifact_fingerprint;
