//! # Core Type Definitions
//!
//! This module contains all core types for the Graftwork composition protocol:
//! - Tensor identifiers (`Identifier`)
//! - Tensor metadata (`DType`, `Shape`, `TensorSpec`)
//! - Live value handles (`TensorRef`, `SparseValue`, `LogicalValue`)
//! - Structured warnings (`ImportWarning`)
//! - Error types (`GraftError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they are used as `BTreeMap`/`BTreeSet` keys
//! - Are plain data: no interior mutability, no global state

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// IDENTIFIER
// =============================================================================

/// Name of a value inside a graph.
///
/// Tensor identifiers have the form `<node>:<output index>`; a bare node name
/// refers to output 0. Control references have the form `^<node>`.
///
/// Identifiers stay strings on purpose: artifacts refer to tensors by name and
/// are only bound to concrete nodes at import time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    /// Wrap a raw tensor or control name.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Identifier of output `index` of node `node`.
    #[must_use]
    pub fn tensor(node: &str, index: u32) -> Self {
        Self(format!("{}:{}", node, index))
    }

    /// Control-dependency reference to `node`.
    #[must_use]
    pub fn control(node: &str) -> Self {
        Self(format!("^{}", node))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a control reference (`^node`).
    #[must_use]
    pub fn is_control(&self) -> bool {
        self.0.starts_with('^')
    }

    /// Split into node name and output index.
    ///
    /// Control references have no output index. A missing or non-numeric
    /// `:suffix` means output 0 of the whole name.
    pub fn parts(&self) -> Result<(&str, Option<u32>), GraftError> {
        let (node, index) = if let Some(node) = self.0.strip_prefix('^') {
            (node, None)
        } else {
            match self.0.rsplit_once(':') {
                Some((node, idx)) => match idx.parse::<u32>() {
                    Ok(i) => (node, Some(i)),
                    Err(_) => (self.0.as_str(), Some(0)),
                },
                None => (self.0.as_str(), Some(0)),
            }
        };

        if node.is_empty() {
            return Err(GraftError::InvalidIdentifier(self.0.clone()));
        }
        Ok((node, index))
    }

    /// Name of the node this identifier refers to.
    pub fn node_name(&self) -> Result<&str, GraftError> {
        self.parts().map(|(node, _)| node)
    }

    /// Rehost this identifier under `scope`.
    ///
    /// `a:0` becomes `scope/a:0` and `^a` becomes `^scope/a`. An empty scope
    /// leaves the identifier unchanged.
    #[must_use]
    pub fn prepend_scope(&self, scope: &str) -> Self {
        if scope.is_empty() {
            return self.clone();
        }
        match self.0.strip_prefix('^') {
            Some(node) => Self(format!("^{}/{}", scope, node)),
            None => Self(format!("{}/{}", scope, self.0)),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// TENSOR METADATA
// =============================================================================

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Float32,
    Float64,
    Int32,
    Int64,
    String,
    Bool,
}

impl DType {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::String => "string",
            Self::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static shape of a tensor.
///
/// `dims == None` means the rank itself is unknown; a `None` entry inside
/// `dims` is a dimension of unknown size.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Shape {
    pub dims: Option<Vec<Option<u64>>>,
}

impl Shape {
    /// Shape of unknown rank.
    #[must_use]
    pub const fn unknown() -> Self {
        Self { dims: None }
    }

    /// Rank-0 shape.
    #[must_use]
    pub const fn scalar() -> Self {
        Self {
            dims: Some(Vec::new()),
        }
    }

    /// Shape with the given dimensions.
    #[must_use]
    pub fn from_dims(dims: &[Option<u64>]) -> Self {
        Self {
            dims: Some(dims.to_vec()),
        }
    }

    /// Rank-1 shape of unknown length.
    #[must_use]
    pub fn vector() -> Self {
        Self::from_dims(&[None])
    }

    /// Two shapes are compatible if some fully-defined shape could satisfy both.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Shape) -> bool {
        match (&self.dims, &other.dims) {
            (Some(a), Some(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| match (x, y) {
                        (Some(x), Some(y)) => x == y,
                        _ => true,
                    })
            }
            _ => true,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dims {
            None => f.write_str("<unknown>"),
            Some(dims) => {
                f.write_str("[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match d {
                        Some(n) => write!(f, "{}", n)?,
                        None => f.write_str("?")?,
                    }
                }
                f.write_str("]")
            }
        }
    }
}

/// Static description of one node output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    /// Create a new tensor spec.
    #[must_use]
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }
}

// =============================================================================
// LIVE VALUES
// =============================================================================

/// Handle to a tensor that exists in a host graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorRef {
    pub id: Identifier,
    pub spec: TensorSpec,
}

impl TensorRef {
    /// Create a new tensor handle.
    #[must_use]
    pub fn new(id: Identifier, spec: TensorSpec) -> Self {
        Self { id, spec }
    }

    /// The tensor's identifier in its graph.
    #[must_use]
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// The tensor's element type.
    #[must_use]
    pub fn dtype(&self) -> DType {
        self.spec.dtype
    }

    /// The tensor's static shape.
    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.spec.shape
    }
}

/// A sparse value expressed as its three component tensors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SparseValue {
    /// `int64 [N, rank]` coordinates of the non-default entries.
    pub indices: TensorRef,
    /// `[N]` entry values.
    pub values: TensorRef,
    /// `int64 [rank]` shape of the equivalent dense tensor.
    pub dense_shape: TensorRef,
}

impl SparseValue {
    /// Create a sparse value from its parts.
    #[must_use]
    pub fn new(indices: TensorRef, values: TensorRef, dense_shape: TensorRef) -> Self {
        Self {
            indices,
            values,
            dense_shape,
        }
    }
}

/// A value passed by logical name through a transform contract.
///
/// Exactly two shapes are supported; anything else cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalValue {
    /// A single tensor.
    Dense(TensorRef),
    /// A sparse tensor as three component tensors.
    Sparse(SparseValue),
}

impl LogicalValue {
    /// Whether this is the sparse variant.
    #[must_use]
    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// The dense tensor, if this is a dense value.
    #[must_use]
    pub fn as_dense(&self) -> Option<&TensorRef> {
        match self {
            Self::Dense(t) => Some(t),
            Self::Sparse(_) => None,
        }
    }

    /// The sparse parts, if this is a sparse value.
    #[must_use]
    pub fn as_sparse(&self) -> Option<&SparseValue> {
        match self {
            Self::Dense(_) => None,
            Self::Sparse(s) => Some(s),
        }
    }
}

impl From<TensorRef> for LogicalValue {
    fn from(t: TensorRef) -> Self {
        Self::Dense(t)
    }
}

impl From<SparseValue> for LogicalValue {
    fn from(s: SparseValue) -> Self {
        Self::Sparse(s)
    }
}

// =============================================================================
// WARNINGS
// =============================================================================

/// Non-fatal conditions detected while importing a fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportWarning {
    /// The fragment declares persisted variables; their values were not restored.
    VariablesNotRestored { names: Vec<String> },
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VariablesNotRestored { names } => write!(
                f,
                "Transform graphs should not have saved variables, but this one has {}; \
                 variable values will not be restored",
                names.len()
            ),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while composing, loading or freezing transforms.
///
/// - No silent failures
/// - Every failure is a deterministic validation failure; none are retried
/// - Offending names are carried in the variant where applicable
#[derive(Debug, Error)]
pub enum GraftError {
    /// Caller supplied flat inputs the artifact's input signature does not declare.
    #[error("Unexpected inputs to transform: {0:?}")]
    UnexpectedInput(BTreeSet<String>),

    /// Total binding requested but some declared inputs remain unbound.
    #[error("Missing required inputs to transform: {0:?}")]
    MissingRequiredInputs(BTreeSet<String>),

    /// A flat key does not end in one of the recognized suffixes.
    #[error("Unexpected key: {0}")]
    UnrecognizedKey(String),

    /// A logical name's flat entries do not form exactly one dense or sparse value.
    #[error("Malformed flat group '{name}': {reason}")]
    MalformedFlatGroup { name: String, reason: String },

    /// The artifact declares asset files, which this crate never loads.
    #[error("Transform artifacts with assets are not supported ({} declared)", .0.len())]
    AssetsUnsupported(Vec<String>),

    /// Freezing with no declared inputs or no declared outputs.
    #[error("Transform contract {0} cannot be empty")]
    EmptyContract(&'static str),

    /// No host graph is attached to the composition context.
    #[error("Composition requires a host graph")]
    NoHostGraph,

    /// The artifact is missing the expected tag set or signature, or is undecodable.
    #[error("Malformed artifact: {0}")]
    ArtifactMalformed(String),

    /// The contract references a tensor the merged graph does not contain.
    #[error("Import inconsistent: {0}")]
    ImportInconsistent(String),

    /// A substituted host tensor has a different element type than the fragment expects.
    #[error("Type mismatch for {identifier}: fragment expects {expected}, host provides {found}")]
    TypeMismatch {
        identifier: String,
        expected: DType,
        found: DType,
    },

    /// A substituted host tensor has a shape incompatible with the fragment's.
    #[error("Shape mismatch for {identifier}: fragment expects {expected}, host provides {found}")]
    ShapeMismatch {
        identifier: String,
        expected: Shape,
        found: Shape,
    },

    /// The requested node was not found in the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node with this name already exists in the graph.
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    /// The identifier cannot be parsed into a node reference.
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// The artifact destination already exists.
    #[error("Artifact destination already exists: {0:?}")]
    ArtifactExists(PathBuf),

    /// Two registered assets share a file name inside `assets/`.
    #[error("Asset file name registered more than once: {0}")]
    DuplicateAsset(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
