//! # Persistence Format
//!
//! Binary serialization for transform artifact bundles.
//!
//! File I/O operations are in the `artifact` module.
//!
//! Format: Header (13 bytes) + postcard-serialized bundle.
//! - 4 bytes: Magic ("GRFT")
//! - 1 byte: Version
//! - 8 bytes: Payload checksum (u64, little-endian)
//!
//! ## Validation
//!
//! Size limits and the header are checked before the payload is decoded.
//! Any failure is reported as `ArtifactMalformed`.

use crate::artifact::SavedArtifact;
use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_ARTIFACT_PAYLOAD_SIZE};
use crate::GraftError;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 13;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The persistence header precedes all bundle data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub checksum: u64,
}

impl PersistenceHeader {
    /// Create a new header for a payload.
    #[must_use]
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
            checksum: payload_checksum(payload),
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), GraftError> {
        if &self.magic != MAGIC_BYTES {
            return Err(GraftError::ArtifactMalformed(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(GraftError::ArtifactMalformed(format!(
                "Unsupported version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[5..13].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraftError> {
        if bytes.len() < HEADER_SIZE {
            return Err(GraftError::ArtifactMalformed(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut checksum = [0u8; 8];
        checksum.copy_from_slice(&bytes[5..13]);
        Ok(Self {
            magic,
            version: bytes[4],
            checksum: u64::from_le_bytes(checksum),
        })
    }
}

/// FNV-1a checksum of a payload.
#[must_use]
pub fn payload_checksum(payload: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    payload.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize an artifact bundle to bytes (header + payload).
///
/// This is a pure transformation - no file I/O.
pub fn artifact_to_bytes(artifact: &SavedArtifact) -> Result<Vec<u8>, GraftError> {
    let payload = postcard::to_stdvec(artifact)
        .map_err(|e| GraftError::SerializationError(e.to_string()))?;
    let header = PersistenceHeader::for_payload(&payload);

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize an artifact bundle from bytes.
///
/// This is a pure transformation - no file I/O.
///
/// Validates, in order:
/// 1. Minimum data size (header must be present)
/// 2. Maximum payload size
/// 3. Header magic bytes and version
/// 4. Payload checksum
pub fn artifact_from_bytes(bytes: &[u8]) -> Result<SavedArtifact, GraftError> {
    if bytes.len() < HEADER_SIZE {
        return Err(GraftError::ArtifactMalformed(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_ARTIFACT_PAYLOAD_SIZE {
        return Err(GraftError::ArtifactMalformed(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_ARTIFACT_PAYLOAD_SIZE
        )));
    }

    let header = PersistenceHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = &bytes[HEADER_SIZE..];
    if payload_checksum(payload) != header.checksum {
        return Err(GraftError::ArtifactMalformed(
            "Payload checksum mismatch".to_string(),
        ));
    }

    postcard::from_bytes(payload).map_err(|e| {
        GraftError::ArtifactMalformed(format!("Failed to deserialize bundle: {}", e))
    })
}

// =============================================================================
// CRYPTOGRAPHIC FINGERPRINT
// =============================================================================

/// Compute a BLAKE3 fingerprint of an artifact's binary encoding.
///
/// Returns the hash as a hex string (64 characters).
///
/// # Requires
///
/// This function is only available with the `crypto-hash` feature enabled.
#[cfg(feature = "crypto-hash")]
pub fn artifact_fingerprint(artifact: &SavedArtifact) -> Result<String, GraftError> {
    let bytes = artifact_to_bytes(artifact)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

// =============================================================================
// TESTS
// =============================================================================
