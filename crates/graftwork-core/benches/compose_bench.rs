//! # Composition Benchmarks
//!
//! Performance benchmarks for graftwork-core codec and composition.
//!
//! Run with: `cargo bench -p graftwork-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graftwork_core::primitives::{TRANSFORM_SIGNATURE, TRANSFORM_TAG};
use graftwork_core::{
    Compositor, DType, Graph, GraphBuilder, Identifier, LogicalMap, LogicalValue, MetaGraph,
    SavedArtifact, Session, Shape, SparseValue, TensorRef, TensorSpec, build_signature_def,
    flatten, unflatten,
};
use std::hint::black_box;

fn int_vec() -> TensorSpec {
    TensorSpec::new(DType::Int64, Shape::vector())
}

/// Logical map with `size` values, every third one sparse.
fn create_logical_map(size: usize) -> LogicalMap {
    (0..size)
        .map(|i| {
            let name = format!("feature_{}", i);
            let tensor = |suffix: &str| {
                TensorRef::new(Identifier::tensor(&format!("{}{}", name, suffix), 0), int_vec())
            };
            let value = if i % 3 == 0 {
                LogicalValue::Sparse(SparseValue::new(
                    tensor("/indices"),
                    tensor("/values"),
                    tensor("/dense_shape"),
                ))
            } else {
                LogicalValue::Dense(tensor(""))
            };
            (name, value)
        })
        .collect()
}

/// Fragment with a chain of `size` ops after a single placeholder.
fn create_chain_fragment(size: usize) -> SavedArtifact {
    let mut graph = Graph::new();
    let input = graph
        .placeholder("x", DType::Int64, Shape::vector())
        .expect("x");
    let mut last = input.clone();
    for i in 0..size {
        last = graph
            .add_op(&format!("step_{}", i), "Neg", &[&last], vec![int_vec()])
            .expect("op")
            .remove(0);
    }

    let mut inputs = LogicalMap::new();
    inputs.insert("x".to_string(), LogicalValue::Dense(input));
    let mut outputs = LogicalMap::new();
    outputs.insert("y".to_string(), LogicalValue::Dense(last));

    let signature = build_signature_def(&flatten(&inputs), &flatten(&outputs)).expect("sig");
    let mut meta = MetaGraph {
        tags: [TRANSFORM_TAG.to_string()].into_iter().collect(),
        graph_def: graph.to_graph_def(),
        ..MetaGraph::default()
    };
    meta.signature_defs
        .insert(TRANSFORM_SIGNATURE.to_string(), signature);
    SavedArtifact {
        meta_graphs: vec![meta],
    }
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");

    for size in [10, 100, 1000].iter() {
        let map = create_logical_map(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(flatten(&map)));
        });
    }

    group.finish();
}

fn bench_unflatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("unflatten");

    for size in [10, 100, 1000].iter() {
        let flat = flatten(&create_logical_map(*size));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(unflatten(flat.clone()).expect("unflatten")));
        });
    }

    group.finish();
}

fn bench_partially_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("partially_apply");

    for size in [10, 100, 1000].iter() {
        let artifact = create_chain_fragment(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut session = Session::with_graph(Graph::new());
                black_box(
                    Compositor::partially_apply(&mut session, &artifact, &LogicalMap::new())
                        .expect("apply"),
                )
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_flatten,
    bench_unflatten,
    bench_partially_apply,
);

criterion_main!(benches);
