//! # Compositor Module
//!
//! Grafts persisted transform fragments into a live host graph.
//!
//! The caller binds fragment inputs by logical name. The compositor
//! flattens them, checks them against the artifact's input signature, imports
//! the fragment under a fresh scope with the bound inputs substituted, and
//! hands back the fragment's outputs plus whatever inputs are still unbound.
//! Unbound inputs can be bound by a later composition step, which is how
//! fragments are chained.

use crate::artifact::SavedArtifact;
use crate::codec::{self, FlatMap, LogicalMap};
use crate::graph::{GraphBuilder, SubstitutionMap};
use crate::primitives::IMPORT_SCOPE_BASE;
use crate::session::Session;
use crate::signature::{load_input_output_signature, Signature};
use crate::{GraftError, Identifier, ImportWarning, TensorRef};
use std::collections::BTreeSet;
use std::path::Path;

/// Result of grafting a fragment with possibly incomplete bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialApplication {
    /// Declared inputs the caller did not bind, resolved inside the import scope.
    pub unbound_inputs: LogicalMap,
    /// Declared outputs, resolved in the host graph.
    pub outputs: LogicalMap,
    /// Scope the fragment was imported under.
    pub scope: String,
    /// Host-graph nodes created by the import.
    pub created_nodes: Vec<String>,
    /// Non-fatal conditions detected during import.
    pub warnings: Vec<ImportWarning>,
}

/// The Compositor handles fragment composition into a host graph.
///
/// The Compositor:
/// - Validates caller bindings against the fragment's contract
/// - Imports the fragment under a scope nobody else has used
/// - Resolves outputs and unbound inputs to host tensors
/// - Never restores variable state
pub struct Compositor;

impl Compositor {
    /// Graft `artifact` into the session's host graph, binding `inputs`.
    ///
    /// Inputs not named in `inputs` are returned as `unbound_inputs`.
    pub fn partially_apply<G: GraphBuilder>(
        session: &mut Session<G>,
        artifact: &SavedArtifact,
        inputs: &LogicalMap,
    ) -> Result<PartialApplication, GraftError> {
        let flat_inputs = codec::flatten(inputs);
        let transform = load_input_output_signature(artifact)?;

        let unexpected: BTreeSet<String> = flat_inputs
            .keys()
            .filter(|key| !transform.inputs.contains(key))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            return Err(GraftError::UnexpectedInput(unexpected));
        }

        let substitutions: SubstitutionMap = flat_inputs
            .iter()
            .filter_map(|(key, tensor)| {
                transform
                    .inputs
                    .get(key)
                    .map(|id| (id.clone(), tensor.clone()))
            })
            .collect();

        // Every contract tensor the import has to produce must exist in the
        // fragment, so a bad contract fails before the host graph changes.
        let fragment = &transform.meta_graph.graph_def;
        let unbound = transform
            .inputs
            .iter()
            .filter(|(key, _)| !flat_inputs.contains_key(*key));
        for (key, id) in transform.outputs.iter().chain(unbound) {
            if !substitutions.contains_key(id) && fragment.tensor_spec(id).is_none() {
                return Err(GraftError::ImportInconsistent(format!(
                    "contract entry {} names {} which the fragment does not produce",
                    key, id
                )));
            }
        }

        let scope = session.allocate_scope(IMPORT_SCOPE_BASE)?;
        let graph = session.graph_mut()?;
        let created_nodes =
            graph.import_graph_def(&transform.meta_graph.graph_def, &scope, &substitutions)?;
        tracing::debug!(
            "Imported transform fragment under scope {} ({} nodes, {} inputs bound)",
            scope,
            created_nodes.len(),
            substitutions.len()
        );

        let mut warnings = Vec::new();
        let variables: BTreeSet<String> = transform
            .meta_graph
            .variables
            .iter()
            .cloned()
            .chain(
                transform
                    .meta_graph
                    .graph_def
                    .nodes
                    .iter()
                    .filter(|n| n.is_variable())
                    .map(|n| n.name.clone()),
            )
            .collect();
        if !variables.is_empty() {
            let warning = ImportWarning::VariablesNotRestored {
                names: variables.into_iter().collect(),
            };
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        let graph: &G = graph;
        let flat_outputs = resolve(&transform.outputs, |_, id| {
            match substitutions.get(id) {
                Some(host) => Ok(host.clone()),
                None => lookup_scoped(graph, &scope, id),
            }
        })?;
        let flat_unbound = resolve(&transform.inputs, |key, id| {
            if flat_inputs.contains_key(key) {
                Ok(None)
            } else {
                lookup_scoped(graph, &scope, id).map(Some)
            }
        })?;

        Ok(PartialApplication {
            unbound_inputs: codec::unflatten(flat_unbound)?,
            outputs: codec::unflatten(flat_outputs)?,
            scope,
            created_nodes,
            warnings,
        })
    }

    /// Graft `artifact` with every declared input bound and return its outputs.
    ///
    /// Fails with `MissingRequiredInputs` naming the logical inputs left unbound.
    pub fn apply<G: GraphBuilder>(
        session: &mut Session<G>,
        artifact: &SavedArtifact,
        inputs: &LogicalMap,
    ) -> Result<LogicalMap, GraftError> {
        let applied = Self::partially_apply(session, artifact, inputs)?;
        if !applied.unbound_inputs.is_empty() {
            return Err(GraftError::MissingRequiredInputs(
                applied.unbound_inputs.into_keys().collect(),
            ));
        }
        Ok(applied.outputs)
    }

    /// Load the artifact at `dir` and partially apply it.
    pub fn partially_apply_saved<G: GraphBuilder>(
        session: &mut Session<G>,
        dir: impl AsRef<Path>,
        inputs: &LogicalMap,
    ) -> Result<PartialApplication, GraftError> {
        let artifact = SavedArtifact::load(dir)?;
        Self::partially_apply(session, &artifact, inputs)
    }

    /// Load the artifact at `dir` and apply it.
    pub fn apply_saved<G: GraphBuilder>(
        session: &mut Session<G>,
        dir: impl AsRef<Path>,
        inputs: &LogicalMap,
    ) -> Result<LogicalMap, GraftError> {
        let artifact = SavedArtifact::load(dir)?;
        Self::apply(session, &artifact, inputs)
    }
}

/// Look up a fragment-local identifier inside its import scope.
fn lookup_scoped<G: GraphBuilder>(
    graph: &G,
    scope: &str,
    id: &Identifier,
) -> Result<TensorRef, GraftError> {
    graph.tensor_by_name(&id.prepend_scope(scope)).map_err(|_| {
        GraftError::ImportInconsistent(format!(
            "contract names {} but scope {} does not contain it",
            id, scope
        ))
    })
}

/// Resolve signature entries into flat tensors, skipping entries mapped to `None`.
fn resolve<T, F>(signature: &Signature, mut f: F) -> Result<FlatMap, GraftError>
where
    T: Into<Option<TensorRef>>,
    F: FnMut(&str, &Identifier) -> Result<T, GraftError>,
{
    let mut flat = FlatMap::new();
    for (key, id) in signature.iter() {
        if let Some(tensor) = f(key, id)?.into() {
            flat.insert(key.to_string(), tensor);
        }
    }
    Ok(flat)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MetaGraph;
    use crate::graph::{Graph, NodeDef};
    use crate::primitives::{TRANSFORM_SIGNATURE, TRANSFORM_TAG};
    use crate::signature::build_signature_def;
    use crate::{DType, LogicalValue, Shape, TensorSpec};

    fn int_vec() -> TensorSpec {
        TensorSpec::new(DType::Int64, Shape::vector())
    }

    /// Fragment computing `c = a + b`, optionally also exporting `a` as `echo`.
    fn add_fragment(echo: bool) -> SavedArtifact {
        let mut g = Graph::new();
        let a = g.placeholder("a", DType::Int64, Shape::vector()).expect("a");
        let b = g.placeholder("b", DType::Int64, Shape::vector()).expect("b");
        let c = g.add_op("c", "Add", &[&a, &b], vec![int_vec()]).expect("c");

        let mut inputs = LogicalMap::new();
        inputs.insert("a".to_string(), LogicalValue::Dense(a.clone()));
        inputs.insert("b".to_string(), LogicalValue::Dense(b));
        let mut outputs = LogicalMap::new();
        outputs.insert("c".to_string(), LogicalValue::Dense(c[0].clone()));
        if echo {
            outputs.insert("echo".to_string(), LogicalValue::Dense(a));
        }

        let signature =
            build_signature_def(&codec::flatten(&inputs), &codec::flatten(&outputs))
                .expect("signature");
        let mut meta = MetaGraph {
            tags: [TRANSFORM_TAG.to_string()].into_iter().collect(),
            graph_def: g.to_graph_def(),
            ..MetaGraph::default()
        };
        meta.signature_defs
            .insert(TRANSFORM_SIGNATURE.to_string(), signature);
        SavedArtifact {
            meta_graphs: vec![meta],
        }
    }

    fn host_with_feed() -> (Session, TensorRef) {
        let mut graph = Graph::new();
        let feed = graph
            .placeholder("feed", DType::Int64, Shape::vector())
            .expect("feed");
        (Session::with_graph(graph), feed)
    }

    fn bind(name: &str, tensor: &TensorRef) -> LogicalMap {
        let mut m = LogicalMap::new();
        m.insert(name.to_string(), LogicalValue::Dense(tensor.clone()));
        m
    }

    #[test]
    fn outputs_resolve_inside_scope() {
        let (mut session, feed) = host_with_feed();
        let applied =
            Compositor::partially_apply(&mut session, &add_fragment(false), &bind("a", &feed))
                .expect("apply");

        let c = applied.outputs["c"].as_dense().expect("dense");
        assert_eq!(c.id.as_str(), "transform/c:0");
        let b = applied.unbound_inputs["b"].as_dense().expect("dense");
        assert_eq!(b.id.as_str(), "transform/b:0");
        assert!(applied.warnings.is_empty());
    }

    #[test]
    fn aliased_output_returns_substituted_tensor() {
        let (mut session, feed) = host_with_feed();
        let applied =
            Compositor::partially_apply(&mut session, &add_fragment(true), &bind("a", &feed))
                .expect("apply");

        assert_eq!(applied.outputs["echo"], LogicalValue::Dense(feed));
    }

    #[test]
    fn no_host_graph_rejected() {
        let mut session: Session = Session::new();
        let result =
            Compositor::partially_apply(&mut session, &add_fragment(false), &LogicalMap::new());
        assert!(matches!(result, Err(GraftError::NoHostGraph)));
    }

    #[test]
    fn missing_output_is_inconsistent() {
        let mut artifact = add_fragment(false);
        artifact.meta_graphs[0].graph_def.nodes.retain(|n| n.name != "c");
        let (mut session, _) = host_with_feed();

        let result = Compositor::partially_apply(&mut session, &artifact, &LogicalMap::new());
        assert!(matches!(result, Err(GraftError::ImportInconsistent(_))));
        assert_eq!(session.graph().expect("graph").node_count(), 1);
        assert!(!session.scopes().is_issued("transform"));
    }

    #[test]
    fn missing_unbound_input_leaves_graph_untouched() {
        let mut artifact = add_fragment(false);
        let graph_def = &mut artifact.meta_graphs[0].graph_def;
        graph_def.nodes.retain(|n| n.name != "b");
        for node in &mut graph_def.nodes {
            node.inputs.retain(|i| i.as_str() != "b:0");
        }
        let (mut session, feed) = host_with_feed();

        let result = Compositor::partially_apply(&mut session, &artifact, &bind("a", &feed));
        assert!(matches!(result, Err(GraftError::ImportInconsistent(_))));
        assert_eq!(session.graph().expect("graph").node_count(), 1);
    }

    #[test]
    fn variables_are_reported_not_restored() {
        let mut artifact = add_fragment(false);
        artifact.meta_graphs[0]
            .graph_def
            .nodes
            .push(NodeDef::new("w", "VariableV2", Vec::new(), vec![int_vec()]));
        let (mut session, feed) = host_with_feed();

        let applied = Compositor::partially_apply(&mut session, &artifact, &bind("a", &feed))
            .expect("apply");
        assert_eq!(
            applied.warnings,
            vec![ImportWarning::VariablesNotRestored {
                names: vec!["w".to_string()]
            }]
        );
    }

    #[test]
    fn apply_with_all_inputs_returns_outputs() {
        let (mut session, feed) = host_with_feed();
        let mut inputs = bind("a", &feed);
        inputs.insert("b".to_string(), LogicalValue::Dense(feed.clone()));

        let outputs =
            Compositor::apply(&mut session, &add_fragment(false), &inputs).expect("apply");
        assert_eq!(outputs.keys().collect::<Vec<_>>(), vec!["c"]);

        let graph = session.graph().expect("graph");
        let c = graph.node("transform/c").expect("c");
        assert_eq!(c.inputs, vec![feed.id.clone(), feed.id]);
    }

    #[test]
    fn mismatched_binding_leaves_graph_untouched() {
        let mut graph = Graph::new();
        let wrong = graph
            .placeholder("wrong", DType::String, Shape::vector())
            .expect("wrong");
        let mut session = Session::with_graph(graph);

        let result =
            Compositor::partially_apply(&mut session, &add_fragment(false), &bind("a", &wrong));
        assert!(matches!(result, Err(GraftError::TypeMismatch { .. })));
        assert_eq!(session.graph().expect("graph").node_count(), 1);
    }
}
