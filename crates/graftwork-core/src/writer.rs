//! # Artifact Writer
//!
//! Freezes a live host graph and a declared contract into a transform artifact.

use crate::artifact::{asset_file_defs, ArtifactFormat, MetaGraph, SavedArtifact};
use crate::codec::{self, FlatMap, LogicalMap};
use crate::graph::GraphBuilder;
use crate::primitives::{TRANSFORM_SIGNATURE, TRANSFORM_TAG};
use crate::session::Session;
use crate::signature::build_signature_def;
use crate::GraftError;
use std::path::Path;

/// The ArtifactWriter captures the session's host graph as a transform fragment.
///
/// The whole host graph is persisted, not just the part reachable from the
/// declared outputs. Variable nodes are listed in the artifact but their
/// values are not captured.
pub struct ArtifactWriter;

impl ArtifactWriter {
    /// Build the in-memory artifact for the session's host graph.
    pub fn build_artifact<G: GraphBuilder>(
        session: &Session<G>,
        inputs: &LogicalMap,
        outputs: &LogicalMap,
    ) -> Result<SavedArtifact, GraftError> {
        let flat_inputs = codec::flatten(inputs);
        let flat_outputs = codec::flatten(outputs);
        let signature = build_signature_def(&flat_inputs, &flat_outputs)?;

        let graph = session.graph()?;
        ensure_live(graph, &flat_inputs)?;
        ensure_live(graph, &flat_outputs)?;

        let asset_files = asset_file_defs(session.assets())?;
        let graph_def = graph.to_graph_def();
        let variables = graph.variable_names();

        let mut meta_graph = MetaGraph {
            tags: [TRANSFORM_TAG.to_string()].into_iter().collect(),
            graph_def,
            asset_files,
            variables,
            ..MetaGraph::default()
        };
        meta_graph
            .signature_defs
            .insert(TRANSFORM_SIGNATURE.to_string(), signature);

        Ok(SavedArtifact {
            meta_graphs: vec![meta_graph],
        })
    }

    /// Freeze the session's host graph with the given contract into `destination`.
    ///
    /// Registered asset files are copied into the artifact. `destination`
    /// must not exist yet.
    pub fn freeze<G: GraphBuilder>(
        session: &Session<G>,
        inputs: &LogicalMap,
        outputs: &LogicalMap,
        destination: impl AsRef<Path>,
        format: ArtifactFormat,
    ) -> Result<SavedArtifact, GraftError> {
        let destination = destination.as_ref();
        let artifact = Self::build_artifact(session, inputs, outputs)?;
        artifact.save(destination, format, session.assets())?;

        tracing::info!(
            "Froze transform artifact to {} ({} nodes, {} assets)",
            destination.display(),
            artifact
                .meta_graphs
                .first()
                .map_or(0, |m| m.graph_def.nodes.len()),
            session.assets().len()
        );
        Ok(artifact)
    }
}

/// Every contract tensor must exist in the graph being frozen.
fn ensure_live<G: GraphBuilder>(graph: &G, flat: &FlatMap) -> Result<(), GraftError> {
    for tensor in flat.values() {
        graph.tensor_by_name(tensor.id())?;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
