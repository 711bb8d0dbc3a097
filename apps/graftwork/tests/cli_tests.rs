//! Tests for binding parsing, config loading and the freeze/apply commands.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use graftwork::cli::{
    Binding, BindingTarget, cmd_apply, cmd_freeze, cmd_inspect, load_host_session,
    resolve_bindings,
};
use graftwork::config::{CliConfig, LogFormat};
use graftwork_core::{
    ArtifactFormat, DType, GraftError, Graph, GraphBuilder, Identifier, LogicalValue,
    SavedArtifact, Shape, TensorSpec,
};
use std::path::Path;

// =============================================================================
// FIXTURES
// =============================================================================

/// Host graph with a dense feed `x`, a sparse feed `tags` and an op `y = -x`.
fn host_graph() -> Graph {
    let mut graph = Graph::new();
    let x = graph.placeholder("x", DType::Float32, Shape::vector()).unwrap();
    graph.sparse_placeholder("tags", DType::String).unwrap();
    graph
        .add_op(
            "y",
            "Neg",
            &[&x],
            vec![TensorSpec::new(DType::Float32, Shape::vector())],
        )
        .unwrap();
    graph
}

fn write_graph(graph: &Graph, path: &Path) {
    std::fs::write(path, serde_json::to_vec(&graph.to_graph_def()).unwrap()).unwrap();
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// BINDING TESTS
// =============================================================================

#[test]
fn test_parse_dense_binding() {
    let binding = Binding::parse("raw=x:0").unwrap();
    assert_eq!(binding.name, "raw");
    assert_eq!(binding.target, BindingTarget::Dense(Identifier::new("x:0")));
}

#[test]
fn test_parse_sparse_binding() {
    let binding =
        Binding::parse("tags=tags/indices:0,tags/values:0,tags/dense_shape:0").unwrap();
    assert_eq!(
        binding.target,
        BindingTarget::Sparse {
            indices: Identifier::new("tags/indices:0"),
            values: Identifier::new("tags/values:0"),
            dense_shape: Identifier::new("tags/dense_shape:0"),
        }
    );
}

#[test]
fn test_parse_rejects_malformed_bindings() {
    for spec in ["raw", "=x:0", "raw=a:0,b:0", "raw=", "raw=^x"] {
        assert!(
            matches!(Binding::parse(spec), Err(GraftError::InvalidIdentifier(_))),
            "{} should be rejected",
            spec
        );
    }
}

#[test]
fn test_resolve_bindings_against_graph() {
    let graph = host_graph();
    let map = resolve_bindings(
        &graph,
        &strings(&[
            "raw=x:0",
            "tags=tags/indices:0,tags/values:0,tags/dense_shape:0",
        ]),
    )
    .unwrap();

    assert_eq!(map["raw"].as_dense().unwrap().dtype(), DType::Float32);
    assert!(matches!(map["tags"], LogicalValue::Sparse(_)));
}

#[test]
fn test_resolve_bindings_rejects_unknown_tensor() {
    let graph = host_graph();
    let result = resolve_bindings(&graph, &strings(&["raw=nope:0"]));
    assert!(matches!(result, Err(GraftError::NodeNotFound(_))));
}

#[test]
fn test_resolve_bindings_rejects_duplicates() {
    let graph = host_graph();
    let result = resolve_bindings(&graph, &strings(&["raw=x:0", "raw=y:0"]));
    assert!(matches!(result, Err(GraftError::InvalidIdentifier(_))));
}

// =============================================================================
// CONFIG TESTS
// =============================================================================

#[test]
fn test_config_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graftwork.toml");
    std::fs::write(
        &path,
        "log_format = \"json\"\nlog_filter = \"graftwork=trace\"\nartifact_format = \"text\"\n",
    )
    .unwrap();

    let config = CliConfig::from_file(&path).unwrap();
    assert_eq!(config.log_format, LogFormat::Json);
    assert_eq!(config.log_filter, "graftwork=trace");
    assert_eq!(config.artifact_format, ArtifactFormat::Text);
}

#[test]
fn test_config_partial_file_keeps_defaults() {
    let config = CliConfig::from_toml_str("artifact_format = \"text\"").unwrap();
    assert_eq!(config.log_format, LogFormat::Text);
    assert_eq!(config.log_filter, CliConfig::default().log_filter);
}

#[test]
fn test_config_rejects_unknown_keys() {
    let result = CliConfig::from_toml_str("colour = true");
    assert!(matches!(result, Err(GraftError::SerializationError(_))));
}

#[test]
fn test_config_explicit_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = CliConfig::resolve(Some(dir.path().join("absent.toml").as_path()));
    assert!(matches!(result, Err(GraftError::IoError(_))));
}

// =============================================================================
// COMMAND TESTS
// =============================================================================

#[test]
fn test_freeze_then_apply_writes_merged_graph() {
    let dir = tempfile::tempdir().unwrap();
    let host_path = dir.path().join("host.json");
    write_graph(&host_graph(), &host_path);

    let artifact = dir.path().join("transform_fn");
    cmd_freeze(
        &host_path,
        &strings(&["raw=x:0"]),
        &strings(&["negated=y:0"]),
        &artifact,
        ArtifactFormat::Binary,
        &[],
        true,
    )
    .unwrap();
    cmd_inspect(&artifact, true).unwrap();

    let mut serving = Graph::new();
    serving
        .placeholder("input", DType::Float32, Shape::vector())
        .unwrap();
    let serving_path = dir.path().join("serving.json");
    write_graph(&serving, &serving_path);

    let merged_path = dir.path().join("merged.json");
    cmd_apply(
        &serving_path,
        &artifact,
        &strings(&["raw=input:0"]),
        false,
        Some(merged_path.as_path()),
        true,
    )
    .unwrap();

    let merged = load_host_session(&merged_path).unwrap();
    let graph = merged.graph().unwrap();
    assert!(graph.contains_node("transform/y"));
    assert_eq!(
        graph.node("transform/y").unwrap().inputs,
        vec![Identifier::new("input:0")]
    );
}

#[test]
fn test_apply_without_all_inputs_requires_partial() {
    let dir = tempfile::tempdir().unwrap();
    let host_path = dir.path().join("host.json");
    write_graph(&host_graph(), &host_path);

    let artifact = dir.path().join("transform_fn");
    cmd_freeze(
        &host_path,
        &strings(&["raw=x:0", "tags=tags/indices:0,tags/values:0,tags/dense_shape:0"]),
        &strings(&["negated=y:0"]),
        &artifact,
        ArtifactFormat::Text,
        &[],
        true,
    )
    .unwrap();
    assert!(SavedArtifact::load(&artifact).is_ok());

    let result = cmd_apply(&host_path, &artifact, &strings(&["raw=x:0"]), false, None, true);
    assert!(matches!(result, Err(GraftError::MissingRequiredInputs(_))));

    cmd_apply(&host_path, &artifact, &strings(&["raw=x:0"]), true, None, true).unwrap();
}

#[test]
fn test_freeze_into_existing_destination_fails() {
    let dir = tempfile::tempdir().unwrap();
    let host_path = dir.path().join("host.json");
    write_graph(&host_graph(), &host_path);

    let result = cmd_freeze(
        &host_path,
        &strings(&["raw=x:0"]),
        &strings(&["negated=y:0"]),
        dir.path(),
        ArtifactFormat::Binary,
        &[],
        true,
    );
    assert!(matches!(result, Err(GraftError::ArtifactExists(_))));
}
