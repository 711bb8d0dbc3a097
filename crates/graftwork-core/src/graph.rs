//! # Graph Engine
//!
//! The deterministic host graph that transform fragments are grafted into.
//!
//! This module implements the `GraphBuilder` trait. The graph is a
//! construction-time structure only: nodes name an op, their input tensors and
//! the static specs of their outputs. Nothing here executes a graph.
//! All data structures use `BTreeMap` for deterministic ordering.

use crate::primitives::{PLACEHOLDER_OP, VARIABLE_OPS};
use crate::{DType, GraftError, Identifier, Shape, SparseValue, TensorRef, TensorSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Map from a fragment-local tensor identifier to the host tensor replacing it.
pub type SubstitutionMap = BTreeMap<Identifier, TensorRef>;

// =============================================================================
// GRAPH DEFINITION
// =============================================================================

/// One node of a graph definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDef {
    /// Unique node name. Scoped names use `/` as separator.
    pub name: String,
    /// Operation type, e.g. `Placeholder` or `Add`.
    pub op: String,
    /// Data inputs (`node:index`) followed by control inputs (`^node`).
    pub inputs: Vec<Identifier>,
    /// Opaque operation attributes.
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Static specs of the node's outputs, by output index.
    pub outputs: Vec<TensorSpec>,
}

impl NodeDef {
    /// Create a node with no attributes.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        op: impl Into<String>,
        inputs: Vec<Identifier>,
        outputs: Vec<TensorSpec>,
    ) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            inputs,
            attrs: BTreeMap::new(),
            outputs,
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Whether this node holds persisted variable state.
    #[must_use]
    pub fn is_variable(&self) -> bool {
        VARIABLE_OPS.contains(&self.op.as_str())
    }
}

/// A serializable graph: the portable form of a `Graph`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphDef {
    pub nodes: Vec<NodeDef>,
}

impl GraphDef {
    /// Static spec of the tensor `id` names, if a node of this definition produces it.
    #[must_use]
    pub fn tensor_spec(&self, id: &Identifier) -> Option<&TensorSpec> {
        let (node, index) = id.parts().ok()?;
        self.nodes
            .iter()
            .find(|n| n.name == node)?
            .outputs
            .get(index? as usize)
    }

    /// Index nodes by name.
    fn index(&self) -> BTreeMap<&str, &NodeDef> {
        self.nodes.iter().map(|n| (n.name.as_str(), n)).collect()
    }
}

// =============================================================================
// GRAPHBUILDER TRAIT
// =============================================================================

/// The GraphBuilder trait is the seam to the host graph engine.
///
/// Composition only ever appends to a host graph: it allocates names, merges
/// fragments and looks tensors up by name.
pub trait GraphBuilder {
    /// Whether `name` is taken, either as a node name or as a name-scope prefix.
    fn is_name_in_use(&self, name: &str) -> bool;

    /// Resolve a tensor identifier to a live tensor handle.
    fn tensor_by_name(&self, id: &Identifier) -> Result<TensorRef, GraftError>;

    /// Merge `def` into this graph under `scope`, replacing every tensor in
    /// `substitutions` with its host counterpart.
    ///
    /// Returns the names of the newly created nodes. On error the graph is
    /// left unchanged.
    fn import_graph_def(
        &mut self,
        def: &GraphDef,
        scope: &str,
        substitutions: &SubstitutionMap,
    ) -> Result<Vec<String>, GraftError>;

    /// Snapshot the graph as a portable definition.
    fn to_graph_def(&self) -> GraphDef;

    /// Names of nodes holding persisted variable state.
    fn variable_names(&self) -> Vec<String>;

    /// Get the total number of nodes.
    fn node_count(&self) -> usize;
}

// =============================================================================
// GRAPH IMPLEMENTATION
// =============================================================================

/// The in-memory host graph.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node storage: name -> NodeDef
    nodes: BTreeMap<String, NodeDef>,
}

/// Join a scope and a name; an empty scope leaves the name untouched.
fn scoped(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", scope, name)
    }
}

fn validate_node_name(name: &str) -> Result<(), GraftError> {
    if name.is_empty() || name.starts_with('^') || name.contains(':') || name.ends_with('/') {
        return Err(GraftError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Check that `id` points at an existing output (or node, for control refs)
/// of the nodes visible through `lookup`.
fn resolves<'a>(
    id: &Identifier,
    lookup: impl Fn(&str) -> Option<&'a NodeDef>,
) -> Result<bool, GraftError> {
    let (node, index) = id.parts()?;
    Ok(match (lookup(node), index) {
        (Some(_), None) => true,
        (Some(def), Some(i)) => (i as usize) < def.outputs.len(),
        (None, _) => false,
    })
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a graph from its portable definition.
    ///
    /// Nodes may appear in any order; references are checked once all nodes
    /// are known.
    pub fn from_graph_def(def: &GraphDef) -> Result<Self, GraftError> {
        let mut nodes = BTreeMap::new();
        for node in &def.nodes {
            validate_node_name(&node.name)?;
            if nodes.insert(node.name.clone(), node.clone()).is_some() {
                return Err(GraftError::DuplicateNode(node.name.clone()));
            }
        }

        for node in nodes.values() {
            for input in &node.inputs {
                if !resolves(input, |n| nodes.get(n))? {
                    return Err(GraftError::NodeNotFound(input.to_string()));
                }
            }
        }

        Ok(Self { nodes })
    }

    /// Add a node. All of its inputs must already exist.
    pub fn add_node(&mut self, node: NodeDef) -> Result<(), GraftError> {
        validate_node_name(&node.name)?;
        if self.nodes.contains_key(&node.name) {
            return Err(GraftError::DuplicateNode(node.name));
        }
        for input in &node.inputs {
            if !resolves(input, |n| self.nodes.get(n))? {
                return Err(GraftError::NodeNotFound(input.to_string()));
            }
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// Add a placeholder node and return its output tensor.
    pub fn placeholder(
        &mut self,
        name: &str,
        dtype: DType,
        shape: Shape,
    ) -> Result<TensorRef, GraftError> {
        let spec = TensorSpec::new(dtype, shape);
        self.add_node(
            NodeDef::new(name, PLACEHOLDER_OP, Vec::new(), vec![spec.clone()])
                .with_attr("dtype", dtype.name()),
        )?;
        Ok(TensorRef::new(Identifier::tensor(name, 0), spec))
    }

    /// Add the three placeholders of a sparse input under `name/`.
    pub fn sparse_placeholder(&mut self, name: &str, dtype: DType) -> Result<SparseValue, GraftError> {
        let indices = self.placeholder(
            &format!("{}/indices", name),
            DType::Int64,
            Shape::from_dims(&[None, None]),
        )?;
        let values = self.placeholder(&format!("{}/values", name), dtype, Shape::vector())?;
        let dense_shape =
            self.placeholder(&format!("{}/dense_shape", name), DType::Int64, Shape::vector())?;
        Ok(SparseValue::new(indices, values, dense_shape))
    }

    /// Add an op consuming `inputs` and return handles to its outputs.
    pub fn add_op(
        &mut self,
        name: &str,
        op: &str,
        inputs: &[&TensorRef],
        outputs: Vec<TensorSpec>,
    ) -> Result<Vec<TensorRef>, GraftError> {
        let node = NodeDef::new(
            name,
            op,
            inputs.iter().map(|t| t.id.clone()).collect(),
            outputs.clone(),
        );
        self.add_node(node)?;
        Ok(outputs
            .into_iter()
            .enumerate()
            .map(|(i, spec)| TensorRef::new(Identifier::tensor(name, i as u32), spec))
            .collect())
    }

    /// Lookup a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.get(name)
    }

    /// Check if the graph contains a node.
    #[must_use]
    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Get all nodes in deterministic order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.values()
    }

    /// Names of the nodes under `scope/`.
    pub fn nodes_in_scope<'a>(&'a self, scope: &str) -> impl Iterator<Item = &'a str> + 'a {
        let prefix = format!("{}/", scope);
        self.nodes
            .range(prefix.clone()..)
            .take_while(move |(name, _)| name.starts_with(&prefix))
            .map(|(name, _)| name.as_str())
    }

    /// Normalize a tensor identifier to `(node, index)`.
    fn tensor_key(id: &Identifier) -> Result<(String, u32), GraftError> {
        match id.parts()? {
            (node, Some(index)) => Ok((node.to_string(), index)),
            (_, None) => Err(GraftError::InvalidIdentifier(id.to_string())),
        }
    }
}

impl GraphBuilder for Graph {
    fn is_name_in_use(&self, name: &str) -> bool {
        self.contains_node(name) || self.nodes_in_scope(name).next().is_some()
    }

    fn tensor_by_name(&self, id: &Identifier) -> Result<TensorRef, GraftError> {
        let (node, index) = Self::tensor_key(id)?;
        let spec = self
            .nodes
            .get(&node)
            .and_then(|n| n.outputs.get(index as usize))
            .ok_or_else(|| GraftError::NodeNotFound(id.to_string()))?;
        Ok(TensorRef::new(Identifier::tensor(&node, index), spec.clone()))
    }

    fn import_graph_def(
        &mut self,
        def: &GraphDef,
        scope: &str,
        substitutions: &SubstitutionMap,
    ) -> Result<Vec<String>, GraftError> {
        let index = def.index();
        if index.len() != def.nodes.len() {
            return Err(GraftError::ImportInconsistent(
                "fragment contains duplicate node names".to_string(),
            ));
        }

        // Validate every substitution against the fragment's producer and the host.
        let mut remap: BTreeMap<(String, u32), Identifier> = BTreeMap::new();
        for (fragment_id, host) in substitutions {
            let key = Self::tensor_key(fragment_id)?;
            let expected = index
                .get(key.0.as_str())
                .and_then(|n| n.outputs.get(key.1 as usize))
                .ok_or_else(|| {
                    GraftError::ImportInconsistent(format!(
                        "attempted to map {} which is not in the fragment",
                        fragment_id
                    ))
                })?;
            let live = self.tensor_by_name(host.id())?;

            if live.dtype() != expected.dtype {
                return Err(GraftError::TypeMismatch {
                    identifier: fragment_id.to_string(),
                    expected: expected.dtype,
                    found: live.dtype(),
                });
            }
            if !live.shape().is_compatible_with(&expected.shape) {
                return Err(GraftError::ShapeMismatch {
                    identifier: fragment_id.to_string(),
                    expected: expected.shape.clone(),
                    found: live.shape().clone(),
                });
            }
            remap.insert(key, live.id);
        }

        // Rewire every fragment node before touching the host graph.
        let mut rehosted = Vec::with_capacity(def.nodes.len());
        let mut names = BTreeSet::new();
        for node in &def.nodes {
            validate_node_name(&node.name)?;
            let name = scoped(scope, &node.name);
            if self.nodes.contains_key(&name) || !names.insert(name.clone()) {
                return Err(GraftError::DuplicateNode(name));
            }

            let mut inputs = Vec::with_capacity(node.inputs.len());
            for input in &node.inputs {
                if !resolves(input, |n| index.get(n).copied())? {
                    return Err(GraftError::ImportInconsistent(format!(
                        "node {} references {} which is not in the fragment",
                        node.name, input
                    )));
                }
                let substituted = match input.parts()? {
                    (producer, Some(i)) => remap.get(&(producer.to_string(), i)).cloned(),
                    (_, None) => None,
                };
                inputs.push(substituted.unwrap_or_else(|| input.prepend_scope(scope)));
            }

            rehosted.push(NodeDef {
                name,
                op: node.op.clone(),
                inputs,
                attrs: node.attrs.clone(),
                outputs: node.outputs.clone(),
            });
        }

        let created: Vec<String> = rehosted.iter().map(|n| n.name.clone()).collect();
        for node in rehosted {
            self.nodes.insert(node.name.clone(), node);
        }
        Ok(created)
    }

    fn to_graph_def(&self) -> GraphDef {
        GraphDef {
            nodes: self.nodes.values().cloned().collect(),
        }
    }

    fn variable_names(&self) -> Vec<String> {
        self.nodes
            .values()
            .filter(|n| n.is_variable())
            .map(|n| n.name.clone())
            .collect()
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
