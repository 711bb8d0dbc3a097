//! # Transform Artifacts
//!
//! The persisted form of a transform fragment.
//!
//! An artifact is a directory holding one bundle file plus an optional
//! `assets/` subdirectory. The bundle contains one or more meta graphs; each
//! meta graph carries a tag set, the graph definition, named signatures, and
//! declarations of asset files and variables.
//!
//! ```text
//! <artifact>/
//!   saved_artifact.bin    (or saved_artifact.json)
//!   assets/               (only if assets were registered at freeze time)
//! ```
//!
//! File I/O lives here; the byte-level format is in `formats`.

use crate::formats::{artifact_from_bytes, artifact_to_bytes};
use crate::graph::GraphDef;
use crate::primitives::{
    ARTIFACT_BINARY_FILE, ARTIFACT_TEXT_FILE, ASSETS_DIR, MAX_ARTIFACT_PAYLOAD_SIZE,
    STAGING_SUFFIX,
};
use crate::{GraftError, Identifier, TensorRef, TensorSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// =============================================================================
// BUNDLE TYPES
// =============================================================================

/// Name and static metadata of one tensor named in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorInfo {
    pub name: Identifier,
    pub spec: TensorSpec,
}

impl From<&TensorRef> for TensorInfo {
    fn from(t: &TensorRef) -> Self {
        Self {
            name: t.id.clone(),
            spec: t.spec.clone(),
        }
    }
}

/// A named input/output contract.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignatureDef {
    pub inputs: BTreeMap<String, TensorInfo>,
    pub outputs: BTreeMap<String, TensorInfo>,
    pub method_name: String,
}

/// An asset file shipped with the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFileDef {
    /// File name relative to the artifact's `assets/` directory.
    pub filename: String,
}

/// One tagged graph inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaGraph {
    pub tags: BTreeSet<String>,
    pub graph_def: GraphDef,
    pub signature_defs: BTreeMap<String, SignatureDef>,
    #[serde(default)]
    pub asset_files: Vec<AssetFileDef>,
    /// Nodes holding variable state when the graph was frozen.
    #[serde(default)]
    pub variables: Vec<String>,
}

impl MetaGraph {
    /// Whether this meta graph's tag set is exactly `tags`.
    #[must_use]
    pub fn has_tags(&self, tags: &[&str]) -> bool {
        self.tags.len() == tags.len() && tags.iter().all(|t| self.tags.contains(*t))
    }
}

/// Bundle encoding on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    /// Header-framed postcard payload.
    #[default]
    Binary,
    /// Pretty-printed JSON.
    Text,
}

/// A loaded transform artifact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SavedArtifact {
    pub meta_graphs: Vec<MetaGraph>,
}

impl SavedArtifact {
    /// Select the meta graph whose tag set is exactly `tags`.
    pub fn choose_meta_graph(&self, tags: &[&str]) -> Result<&MetaGraph, GraftError> {
        self.meta_graphs
            .iter()
            .find(|m| m.has_tags(tags))
            .ok_or_else(|| {
                GraftError::ArtifactMalformed(format!("no meta graph tagged {:?}", tags))
            })
    }

    /// Load an artifact directory.
    ///
    /// The binary bundle is preferred; the text bundle is the fallback.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, GraftError> {
        let dir = dir.as_ref();
        let binary = dir.join(ARTIFACT_BINARY_FILE);
        let text = dir.join(ARTIFACT_TEXT_FILE);

        if binary.is_file() {
            let bytes = read_bounded(&binary)?;
            artifact_from_bytes(&bytes)
        } else if text.is_file() {
            let bytes = read_bounded(&text)?;
            serde_json::from_slice(&bytes).map_err(|e| {
                GraftError::ArtifactMalformed(format!("failed to parse text bundle: {}", e))
            })
        } else {
            Err(GraftError::ArtifactMalformed(format!(
                "{} contains neither {} nor {}",
                dir.display(),
                ARTIFACT_BINARY_FILE,
                ARTIFACT_TEXT_FILE
            )))
        }
    }

    /// Write this artifact to a new directory, copying `assets` into it.
    ///
    /// `dir` must not exist yet. Everything is written to a staging sibling
    /// first and renamed into place, so a failed save leaves no `dir` behind.
    pub fn save(
        &self,
        dir: impl AsRef<Path>,
        format: ArtifactFormat,
        assets: &[PathBuf],
    ) -> Result<(), GraftError> {
        let dir = dir.as_ref();
        if dir.exists() {
            return Err(GraftError::ArtifactExists(dir.to_path_buf()));
        }
        asset_file_defs(assets)?;

        let staging = staging_dir(dir)?;
        if staging.exists() {
            remove_staging(&staging)?;
        }

        let written = self
            .write_into(&staging, format, assets)
            .and_then(|()| {
                std::fs::rename(&staging, dir).map_err(|e| {
                    GraftError::IoError(format!("cannot move artifact to {}: {}", dir.display(), e))
                })
            });
        if written.is_err() && staging.exists() {
            if let Err(cleanup) = remove_staging(&staging) {
                tracing::warn!("{}", cleanup);
            }
        }
        written
    }

    /// Write the bundle and assets into `dir`, creating it.
    fn write_into(
        &self,
        dir: &Path,
        format: ArtifactFormat,
        assets: &[PathBuf],
    ) -> Result<(), GraftError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            GraftError::IoError(format!("cannot create {}: {}", dir.display(), e))
        })?;

        if !assets.is_empty() {
            let assets_dir = dir.join(ASSETS_DIR);
            std::fs::create_dir_all(&assets_dir).map_err(|e| {
                GraftError::IoError(format!("cannot create {}: {}", assets_dir.display(), e))
            })?;
            for asset in assets {
                let filename = asset_filename(asset)?;
                std::fs::copy(asset, assets_dir.join(filename)).map_err(|e| {
                    GraftError::IoError(format!("cannot copy asset {}: {}", asset.display(), e))
                })?;
            }
        }

        let (path, bytes) = match format {
            ArtifactFormat::Binary => (dir.join(ARTIFACT_BINARY_FILE), artifact_to_bytes(self)?),
            ArtifactFormat::Text => (
                dir.join(ARTIFACT_TEXT_FILE),
                serde_json::to_vec_pretty(self)
                    .map_err(|e| GraftError::SerializationError(e.to_string()))?,
            ),
        };
        std::fs::write(&path, bytes)
            .map_err(|e| GraftError::IoError(format!("cannot write {}: {}", path.display(), e)))
    }
}

/// Declarations for `assets`, in registration order.
///
/// Assets are stored flat under `assets/`, so two paths with the same file
/// name are rejected.
pub(crate) fn asset_file_defs(assets: &[PathBuf]) -> Result<Vec<AssetFileDef>, GraftError> {
    let mut seen = BTreeSet::new();
    assets
        .iter()
        .map(|path| {
            let filename = asset_filename(path)?;
            if !seen.insert(filename.clone()) {
                return Err(GraftError::DuplicateAsset(filename));
            }
            Ok(AssetFileDef { filename })
        })
        .collect()
}

/// File name an asset is stored under inside `assets/`.
fn asset_filename(path: &Path) -> Result<String, GraftError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| GraftError::IoError(format!("asset path has no file name: {}", path.display())))
}

/// Hidden sibling of `dir` that a save is staged in.
fn staging_dir(dir: &Path) -> Result<PathBuf, GraftError> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            GraftError::IoError(format!("artifact path has no directory name: {}", dir.display()))
        })?;
    let parent = match dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| {
        GraftError::IoError(format!("cannot create {}: {}", parent.display(), e))
    })?;
    Ok(parent.join(format!(".{}{}", name, STAGING_SUFFIX)))
}

fn remove_staging(staging: &Path) -> Result<(), GraftError> {
    std::fs::remove_dir_all(staging).map_err(|e| {
        GraftError::IoError(format!("cannot remove {}: {}", staging.display(), e))
    })
}

/// Read a bundle file, refusing anything over the size limit before reading it.
fn read_bounded(path: &Path) -> Result<Vec<u8>, GraftError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraftError::IoError(format!("cannot stat {}: {}", path.display(), e)))?;
    if metadata.len() > MAX_ARTIFACT_PAYLOAD_SIZE as u64 {
        return Err(GraftError::ArtifactMalformed(format!(
            "bundle size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            MAX_ARTIFACT_PAYLOAD_SIZE
        )));
    }
    std::fs::read(path)
        .map_err(|e| GraftError::IoError(format!("cannot read {}: {}", path.display(), e)))
}

// =============================================================================
// TESTS
// =============================================================================
