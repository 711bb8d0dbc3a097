//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use graftwork_core::{
    ArtifactFormat, ArtifactWriter, Compositor, FlatKey, GraftError, Graph, GraphBuilder,
    GraphDef, Identifier, LogicalMap, LogicalValue, SavedArtifact, Session, SparseValue,
    TensorInfo, artifact_fingerprint,
    codec::SEPARATOR,
    primitives::{TRANSFORM_SIGNATURE, TRANSFORM_TAG},
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a host graph definition (100 MB).
const MAX_GRAPH_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), GraftError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraftError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(GraftError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and ensure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, GraftError> {
    let canonical = path.canonicalize().map_err(|e| {
        GraftError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(GraftError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate that the parent directory of an output path exists.
fn validate_output_path(path: &Path) -> Result<PathBuf, GraftError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        GraftError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(GraftError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| GraftError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// BINDINGS
// =============================================================================

/// Host tensors a logical name is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingTarget {
    /// `name=node:0`
    Dense(Identifier),
    /// `name=indices:0,values:0,shape:0`
    Sparse {
        indices: Identifier,
        values: Identifier,
        dense_shape: Identifier,
    },
}

/// A parsed `name=target` command-line binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Logical name.
    pub name: String,
    /// Host tensors.
    pub target: BindingTarget,
}

impl Binding {
    /// Parse `name=node:0` or `name=indices:0,values:0,shape:0`.
    pub fn parse(spec: &str) -> Result<Self, GraftError> {
        let invalid = || GraftError::InvalidIdentifier(spec.to_string());

        let (name, target) = spec.split_once('=').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(invalid());
        }

        let ids = target
            .split(',')
            .map(|part| {
                let id = Identifier::new(part.trim());
                id.parts()?;
                if id.is_control() {
                    return Err(invalid());
                }
                Ok(id)
            })
            .collect::<Result<Vec<_>, GraftError>>()?;

        let target = match <[Identifier; 3]>::try_from(ids) {
            Ok([indices, values, dense_shape]) => BindingTarget::Sparse {
                indices,
                values,
                dense_shape,
            },
            Err(mut ids) if ids.len() == 1 => match ids.pop() {
                Some(id) => BindingTarget::Dense(id),
                None => return Err(invalid()),
            },
            Err(_) => return Err(invalid()),
        };

        Ok(Self {
            name: name.to_string(),
            target,
        })
    }

    /// Look up the bound tensors in `graph`.
    pub fn resolve<G: GraphBuilder>(&self, graph: &G) -> Result<LogicalValue, GraftError> {
        Ok(match &self.target {
            BindingTarget::Dense(id) => LogicalValue::Dense(graph.tensor_by_name(id)?),
            BindingTarget::Sparse {
                indices,
                values,
                dense_shape,
            } => LogicalValue::Sparse(SparseValue::new(
                graph.tensor_by_name(indices)?,
                graph.tensor_by_name(values)?,
                graph.tensor_by_name(dense_shape)?,
            )),
        })
    }
}

/// Parse every binding and resolve it against `graph`.
///
/// A logical name bound twice is rejected.
pub fn resolve_bindings<G: GraphBuilder>(
    graph: &G,
    specs: &[String],
) -> Result<LogicalMap, GraftError> {
    let mut map = LogicalMap::new();
    for spec in specs {
        let binding = Binding::parse(spec)?;
        let value = binding.resolve(graph)?;
        if map.insert(binding.name.clone(), value).is_some() {
            return Err(GraftError::InvalidIdentifier(format!(
                "{}: bound more than once",
                binding.name
            )));
        }
    }
    Ok(map)
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Show the contract and declarations of an artifact.
///
/// Works on artifacts that declare assets too, which `apply` rejects.
pub fn cmd_inspect(artifact_dir: &Path, json_mode: bool) -> Result<(), GraftError> {
    let artifact = SavedArtifact::load(artifact_dir)?;
    let meta = artifact.choose_meta_graph(&[TRANSFORM_TAG])?;
    let signature = meta.signature_defs.get(TRANSFORM_SIGNATURE).ok_or_else(|| {
        GraftError::ArtifactMalformed(format!("missing signature '{}'", TRANSFORM_SIGNATURE))
    })?;

    let inputs = logical_names(&signature.inputs)?;
    let outputs = logical_names(&signature.outputs)?;
    let assets: Vec<&str> = meta.asset_files.iter().map(|a| a.filename.as_str()).collect();

    if json_mode {
        let output = serde_json::json!({
            "artifact": artifact_dir.to_string_lossy(),
            "tags": meta.tags,
            "inputs": inputs,
            "outputs": outputs,
            "node_count": meta.graph_def.nodes.len(),
            "assets": assets,
            "variables": meta.variables,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Transform Artifact");
    println!("==================");
    println!("Path:      {}", artifact_dir.display());
    println!("Tags:      {}", join(meta.tags.iter()));
    println!("Inputs:    {}", join(inputs.iter()));
    println!("Outputs:   {}", join(outputs.iter()));
    println!("Nodes:     {}", meta.graph_def.nodes.len());
    println!("Assets:    {}", join(assets.iter()));
    println!("Variables: {}", join(meta.variables.iter()));

    Ok(())
}

/// Logical names declared by a flat signature map.
fn logical_names(flat: &BTreeMap<String, TensorInfo>) -> Result<BTreeSet<String>, GraftError> {
    flat.keys()
        .map(|key| FlatKey::parse(key).map(|k| k.logical().to_string()))
        .collect()
}

// =============================================================================
// APPLY COMMAND
// =============================================================================

/// Graft an artifact into the host graph read from `graph_path`.
pub fn cmd_apply(
    graph_path: &Path,
    artifact_dir: &Path,
    inputs: &[String],
    partial: bool,
    out: Option<&Path>,
    json_mode: bool,
) -> Result<(), GraftError> {
    let validated_out = out.map(validate_output_path).transpose()?;
    let mut session = load_host_session(graph_path)?;
    let bound = resolve_bindings(session.graph()?, inputs)?;

    let (outputs, unbound, scope) = if partial {
        let applied = Compositor::partially_apply_saved(&mut session, artifact_dir, &bound)?;
        (applied.outputs, applied.unbound_inputs, Some(applied.scope))
    } else {
        let outputs = Compositor::apply_saved(&mut session, artifact_dir, &bound)?;
        (outputs, LogicalMap::new(), None)
    };

    if let Some(path) = &validated_out {
        write_graph(session.graph()?, path)?;
    }

    if json_mode {
        let output = serde_json::json!({
            "scope": scope,
            "outputs": to_json(&outputs)?,
            "unbound_inputs": to_json(&unbound)?,
            "node_count": session.graph()?.node_count(),
            "written_to": validated_out.as_ref().map(|p| p.to_string_lossy()),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    if let Some(scope) = &scope {
        println!("Scope: {}", scope);
    }
    println!("Outputs:");
    for (name, value) in &outputs {
        println!("  {} = {}", name, describe(value));
    }
    if partial {
        println!("Unbound inputs:");
        for (name, value) in &unbound {
            println!("  {} = {}", name, describe(value));
        }
    }
    if let Some(path) = &validated_out {
        println!("Wrote merged graph to {:?}", path);
    }

    Ok(())
}

// =============================================================================
// FREEZE COMMAND
// =============================================================================

/// Freeze the host graph read from `graph_path` into an artifact at `dest`.
pub fn cmd_freeze(
    graph_path: &Path,
    inputs: &[String],
    outputs: &[String],
    dest: &Path,
    format: ArtifactFormat,
    assets: &[PathBuf],
    json_mode: bool,
) -> Result<(), GraftError> {
    let mut session = load_host_session(graph_path)?;
    for asset in assets {
        session.register_asset(validate_file_path(asset)?);
    }

    let graph = session.graph()?;
    let inputs = resolve_bindings(graph, inputs)?;
    let outputs = resolve_bindings(graph, outputs)?;

    let artifact = ArtifactWriter::freeze(&session, &inputs, &outputs, dest, format)?;
    let node_count = artifact
        .meta_graphs
        .first()
        .map_or(0, |m| m.graph_def.nodes.len());

    if json_mode {
        let output = serde_json::json!({
            "destination": dest.to_string_lossy(),
            "format": format,
            "node_count": node_count,
            "inputs": inputs.keys().collect::<Vec<_>>(),
            "outputs": outputs.keys().collect::<Vec<_>>(),
            "assets": assets.len(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!(
        "Froze {} nodes to {:?} ({} inputs, {} outputs, {} assets)",
        node_count,
        dest,
        inputs.len(),
        outputs.len(),
        assets.len()
    );

    Ok(())
}

// =============================================================================
// HASH COMMAND
// =============================================================================

/// Compute the BLAKE3 fingerprint of an artifact.
pub fn cmd_hash(artifact_dir: &Path, json_mode: bool) -> Result<(), GraftError> {
    let artifact = SavedArtifact::load(artifact_dir)?;
    let hash = artifact_fingerprint(&artifact)?;

    if json_mode {
        let output = serde_json::json!({
            "algorithm": "blake3",
            "hash": hash,
            "artifact": artifact_dir.to_string_lossy(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else {
        println!("BLAKE3: {}", hash);
    }

    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Read a JSON graph definition and wrap it in a session.
pub fn load_host_session(path: &Path) -> Result<Session, GraftError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_GRAPH_FILE_SIZE)?;

    let data = std::fs::read(&validated)
        .map_err(|e| GraftError::IoError(format!("Read graph: {}", e)))?;
    let def: GraphDef = serde_json::from_slice(&data)
        .map_err(|e| GraftError::SerializationError(format!("Parse graph: {}", e)))?;

    tracing::debug!("Loaded host graph {} ({} nodes)", path.display(), def.nodes.len());
    Ok(Session::with_graph(Graph::from_graph_def(&def)?))
}

/// Write a graph definition as pretty JSON.
fn write_graph(graph: &Graph, path: &Path) -> Result<(), GraftError> {
    let data = serde_json::to_vec_pretty(&graph.to_graph_def())
        .map_err(|e| GraftError::SerializationError(e.to_string()))?;
    std::fs::write(path, &data)
        .map_err(|e| GraftError::IoError(format!("Write graph: {}", e)))
}

fn to_json(map: &LogicalMap) -> Result<serde_json::Value, GraftError> {
    serde_json::to_value(map).map_err(|e| GraftError::SerializationError(e.to_string()))
}

/// One-line rendering of a logical value.
fn describe(value: &LogicalValue) -> String {
    match value {
        LogicalValue::Dense(t) => format!("{} ({} {})", t.id, t.dtype(), t.shape()),
        LogicalValue::Sparse(s) => format!(
            "sparse {} [indices={}, values={}, dense_shape={}]",
            s.values.dtype(),
            s.indices.id,
            s.values.id,
            s.dense_shape.id
        ),
    }
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    let parts: Vec<String> = items.map(|item| item.to_string()).collect();
    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(", ")
    }
}

// =============================================================================
// TESTS
// =============================================================================
