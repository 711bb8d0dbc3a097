//! # Property-Based Tests
//!
//! Codec and composition invariants checked with proptest.

use graftwork_core::{
    Compositor, DType, FlatKey, GraftError, Graph, Identifier, LogicalMap, LogicalValue,
    MetaGraph, SavedArtifact, Session, Shape, SparseValue, Suffix, TensorRef, TensorSpec,
    build_signature_def, flatten, unflatten,
};
use graftwork_core::primitives::{TRANSFORM_SIGNATURE, TRANSFORM_TAG};
use graftwork_core::GraphBuilder;
use proptest::collection::btree_map;
use proptest::prelude::*;
use std::collections::BTreeSet;

// =============================================================================
// STRATEGIES
// =============================================================================

fn tensor(node: &str, dtype: DType) -> TensorRef {
    TensorRef::new(
        Identifier::tensor(node, 0),
        TensorSpec::new(dtype, Shape::vector()),
    )
}

/// A logical value whose tensors live on nodes derived from `node`.
fn value_for(node: &str, sparse: bool) -> LogicalValue {
    if sparse {
        LogicalValue::Sparse(SparseValue::new(
            tensor(&format!("{}/indices", node), DType::Int64),
            tensor(&format!("{}/values", node), DType::String),
            tensor(&format!("{}/dense_shape", node), DType::Int64),
        ))
    } else {
        LogicalValue::Dense(tensor(node, DType::Float32))
    }
}

/// Logical maps with names that never contain the separator.
fn logical_map() -> impl Strategy<Value = LogicalMap> {
    btree_map("[a-z][a-z0-9_]{0,7}", any::<bool>(), 0..12).prop_map(|kinds| {
        kinds
            .into_iter()
            .map(|(name, sparse)| {
                let value = value_for(&name, sparse);
                (name, value)
            })
            .collect()
    })
}

/// A single-placeholder fragment with input `x` and output `y`.
fn identity_fragment() -> SavedArtifact {
    let mut g = Graph::new();
    let x = g
        .placeholder("x", DType::Float32, Shape::vector())
        .expect("x");
    let y = g
        .add_op(
            "y",
            "Identity",
            &[&x],
            vec![TensorSpec::new(DType::Float32, Shape::vector())],
        )
        .expect("y");

    let mut inputs = LogicalMap::new();
    inputs.insert("x".to_string(), LogicalValue::Dense(x));
    let mut outputs = LogicalMap::new();
    outputs.insert("y".to_string(), LogicalValue::Dense(y[0].clone()));

    let signature =
        build_signature_def(&flatten(&inputs), &flatten(&outputs)).expect("signature");
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

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Unflattening a flattened map returns the original map.
    #[test]
    fn flatten_round_trip(map in logical_map()) {
        let restored = unflatten(flatten(&map)).expect("unflatten");
        prop_assert_eq!(restored, map);
    }

    /// N dense and M sparse values flatten to exactly N + 3M keys.
    #[test]
    fn flat_key_count(map in logical_map()) {
        let sparse = map.values().filter(|v| v.is_sparse()).count();
        let dense = map.len() - sparse;
        prop_assert_eq!(flatten(&map).len(), dense + 3 * sparse);
    }

    /// Every flat key parses back to its logical name with a suffix that
    /// matches the value kind.
    #[test]
    fn flat_keys_partition_by_logical_name(map in logical_map()) {
        for key in flatten(&map).keys() {
            let parsed = FlatKey::parse(key).expect("parse");
            let value = map.get(parsed.logical());
            prop_assert!(value.is_some());
            let is_dense_suffix = parsed.suffix() == Suffix::DenseTensor;
            prop_assert_eq!(is_dense_suffix, !value.is_some_and(LogicalValue::is_sparse));
        }
    }

    /// Repeated imports into one session yield the deterministic scope sequence.
    #[test]
    fn scope_sequence_is_deterministic(imports in 1usize..8) {
        let artifact = identity_fragment();
        let mut session = Session::with_graph(Graph::new());

        let mut scopes = Vec::new();
        for _ in 0..imports {
            let applied = Compositor::partially_apply(&mut session, &artifact, &LogicalMap::new())
                .expect("apply");
            scopes.push(applied.scope);
        }

        let expected: Vec<String> = (0..imports)
            .map(|i| if i == 0 { "transform".to_string() } else { format!("transform_{}", i) })
            .collect();
        prop_assert_eq!(scopes, expected);
    }

    /// Any logical name outside the contract is rejected, whatever else is bound.
    #[test]
    fn names_outside_contract_rejected(extra in "[a-w][a-z]{0,5}", bind_x in any::<bool>()) {
        prop_assume!(extra != "x");
        let mut graph = Graph::new();
        let feed = graph
            .placeholder("feed", DType::Float32, Shape::vector())
            .expect("feed");
        let mut session = Session::with_graph(graph);

        let mut inputs = LogicalMap::new();
        if bind_x {
            inputs.insert("x".to_string(), LogicalValue::Dense(feed.clone()));
        }
        inputs.insert(extra.clone(), LogicalValue::Dense(feed));

        let result = Compositor::partially_apply(&mut session, &identity_fragment(), &inputs);
        let expected = BTreeSet::from([format!("{}$dense_tensor", extra)]);
        prop_assert!(matches!(result, Err(GraftError::UnexpectedInput(ref keys)) if *keys == expected));
    }
}
