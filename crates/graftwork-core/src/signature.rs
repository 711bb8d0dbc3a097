//! # Signature Protocol
//!
//! The input/output contract of a transform fragment.
//!
//! A signature maps flat keys (see `codec`) to the identifiers of the tensors
//! that carry them. Signatures are read from an artifact at composition time,
//! where identifiers are fragment-local names resolved during import, or built
//! from live tensors at freeze time.

use crate::artifact::{MetaGraph, SavedArtifact, SignatureDef, TensorInfo};
use crate::codec::FlatMap;
use crate::primitives::{PREDICT_METHOD_NAME, TRANSFORM_SIGNATURE, TRANSFORM_TAG};
use crate::{GraftError, Identifier};
use std::collections::BTreeMap;

/// Mapping from flat key to underlying tensor identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    entries: BTreeMap<String, Identifier>,
}

impl Signature {
    /// Create an empty signature.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier declared for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Identifier> {
        self.entries.get(key)
    }

    /// Whether `key` is declared.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Declared keys and identifiers in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Identifier)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Declared keys in deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of declared entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&BTreeMap<String, TensorInfo>> for Signature {
    fn from(infos: &BTreeMap<String, TensorInfo>) -> Self {
        Self {
            entries: infos
                .iter()
                .map(|(key, info)| (key.clone(), info.name.clone()))
                .collect(),
        }
    }
}

impl FromIterator<(String, Identifier)> for Signature {
    fn from_iter<I: IntoIterator<Item = (String, Identifier)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// The transform meta graph of an artifact with its two signatures.
#[derive(Debug, Clone)]
pub struct LoadedTransform<'a> {
    pub meta_graph: &'a MetaGraph,
    pub inputs: Signature,
    pub outputs: Signature,
}

/// Select the transform meta graph and read its input and output signatures.
///
/// Fails with `ArtifactMalformed` when the `transform` tag set is absent,
/// with `AssetsUnsupported` when the meta graph declares asset files (checked
/// before anything else in the meta graph), and with `ArtifactMalformed` when
/// the `transform_signature` signature is absent.
pub fn load_input_output_signature(
    artifact: &SavedArtifact,
) -> Result<LoadedTransform<'_>, GraftError> {
    let meta_graph = artifact.choose_meta_graph(&[TRANSFORM_TAG])?;

    if !meta_graph.asset_files.is_empty() {
        return Err(GraftError::AssetsUnsupported(
            meta_graph
                .asset_files
                .iter()
                .map(|a| a.filename.clone())
                .collect(),
        ));
    }

    let signature = meta_graph
        .signature_defs
        .get(TRANSFORM_SIGNATURE)
        .ok_or_else(|| {
            GraftError::ArtifactMalformed(format!("signature {} not found", TRANSFORM_SIGNATURE))
        })?;

    Ok(LoadedTransform {
        meta_graph,
        inputs: Signature::from(&signature.inputs),
        outputs: Signature::from(&signature.outputs),
    })
}

/// Build the transform contract from flattened live inputs and outputs.
///
/// Keys are kept verbatim so flat names survive the round trip.
pub fn build_signature_def(
    flat_inputs: &FlatMap,
    flat_outputs: &FlatMap,
) -> Result<SignatureDef, GraftError> {
    if flat_inputs.is_empty() {
        return Err(GraftError::EmptyContract("inputs"));
    }
    if flat_outputs.is_empty() {
        return Err(GraftError::EmptyContract("outputs"));
    }

    let infos = |flat: &FlatMap| -> BTreeMap<String, TensorInfo> {
        flat.iter()
            .map(|(key, tensor)| (key.clone(), TensorInfo::from(tensor)))
            .collect()
    };

    Ok(SignatureDef {
        inputs: infos(flat_inputs),
        outputs: infos(flat_outputs),
        method_name: PREDICT_METHOD_NAME.to_string(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
