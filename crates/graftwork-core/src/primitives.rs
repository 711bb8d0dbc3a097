//! # Protocol Primitives
//!
//! Hardcoded constants of the Graftwork transform protocol.
//!
//! These values are part of the artifact contract: artifacts written with one
//! set of constants are only readable by code that agrees on them.

/// Tag identifying the meta graph that holds a transform fragment.
pub const TRANSFORM_TAG: &str = "transform";

/// Key of the signature that declares a transform's inputs and outputs.
pub const TRANSFORM_SIGNATURE: &str = "transform_signature";

/// Method name recorded on transform signatures.
pub const PREDICT_METHOD_NAME: &str = "predict";

/// Base name for import scopes. Repeated imports get `transform_1`, `transform_2`, ...
pub const IMPORT_SCOPE_BASE: &str = "transform";

/// Op name of placeholder nodes (graph inputs).
pub const PLACEHOLDER_OP: &str = "Placeholder";

/// Op names whose nodes hold persisted variable state.
pub const VARIABLE_OPS: &[&str] = &["Variable", "VariableV2", "VarHandleOp"];

// =============================================================================
// ARTIFACT LAYOUT
// =============================================================================

/// Magic bytes for the Graftwork binary artifact header.
///
/// - File Header = Magic Bytes ("GRFT") + Version (u8) + Checksum (u64 LE) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"GRFT";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

/// File name of the binary bundle inside an artifact directory.
pub const ARTIFACT_BINARY_FILE: &str = "saved_artifact.bin";

/// File name of the text bundle inside an artifact directory.
pub const ARTIFACT_TEXT_FILE: &str = "saved_artifact.json";

/// Subdirectory holding copied asset files.
pub const ASSETS_DIR: &str = "assets";

/// Suffix of the hidden sibling directory an artifact is staged in while saving.
pub const STAGING_SUFFIX: &str = ".partial";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum accepted size of an artifact bundle file (512 MiB).
///
/// Checked before any decoding to prevent memory exhaustion from malicious or
/// corrupted data.
pub const MAX_ARTIFACT_PAYLOAD_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of attempts when searching for a free import scope name.
pub const MAX_SCOPE_ATTEMPTS: u64 = 1_000_000;
