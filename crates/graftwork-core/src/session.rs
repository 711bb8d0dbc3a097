//! # Session Module
//!
//! The explicit composition context.
//!
//! A `Session` owns the host graph that fragments are grafted into, the
//! allocator that hands out import scopes, and the asset files registered
//! for the next freeze. Every composition call takes the session by `&mut`,
//! so scope allocation and the following import are serialized per session.
//! Callers sharing a session across threads wrap it in `Arc<Mutex<_>>`.

use crate::graph::{Graph, GraphBuilder};
use crate::primitives::MAX_SCOPE_ATTEMPTS;
use crate::GraftError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

// =============================================================================
// SCOPE ALLOCATOR
// =============================================================================

/// Hands out import scope names that are unique within one host graph.
///
/// For a base `transform` the candidates are `transform`, `transform_1`,
/// `transform_2`, ... A candidate is skipped if it was handed out before or
/// if the graph already uses it as a node name or scope prefix.
#[derive(Debug, Clone, Default)]
pub struct ScopeAllocator {
    /// Next suffix to try, per base name.
    counters: BTreeMap<String, u64>,
    /// Every scope handed out so far.
    issued: BTreeSet<String>,
}

impl ScopeAllocator {
    /// Create an allocator that has issued nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh scope for `base` in `graph` and mark it used.
    pub fn allocate<G: GraphBuilder>(&mut self, base: &str, graph: &G) -> Result<String, GraftError> {
        let counter = self.counters.entry(base.to_string()).or_insert(0);

        for _ in 0..MAX_SCOPE_ATTEMPTS {
            let candidate = if *counter == 0 {
                base.to_string()
            } else {
                format!("{}_{}", base, counter)
            };
            *counter = counter.saturating_add(1);

            if !self.issued.contains(&candidate) && !graph.is_name_in_use(&candidate) {
                self.issued.insert(candidate.clone());
                return Ok(candidate);
            }
        }

        Err(GraftError::ImportInconsistent(format!(
            "no free import scope for base '{}'",
            base
        )))
    }

    /// Whether `scope` has been handed out by this allocator.
    #[must_use]
    pub fn is_issued(&self, scope: &str) -> bool {
        self.issued.contains(scope)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// A Session combines a host graph with its scope allocator.
///
/// The host graph is optional: composition against a session without one
/// fails with `GraftError::NoHostGraph`.
#[derive(Debug)]
pub struct Session<G = Graph> {
    /// The host graph, if attached.
    graph: Option<G>,
    /// Import scope allocator for the attached graph.
    scopes: ScopeAllocator,
    /// Asset files to bundle on the next freeze.
    assets: Vec<PathBuf>,
}

impl<G> Default for Session<G> {
    fn default() -> Self {
        Self {
            graph: None,
            scopes: ScopeAllocator::new(),
            assets: Vec::new(),
        }
    }
}

impl<G: GraphBuilder> Session<G> {
    /// Create a session with no host graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session around an existing host graph.
    #[must_use]
    pub fn with_graph(graph: G) -> Self {
        Self {
            graph: Some(graph),
            ..Self::default()
        }
    }

    /// Attach a host graph, returning the previous one.
    ///
    /// The scope allocator is reset: scopes are only unique per graph.
    pub fn attach(&mut self, graph: G) -> Option<G> {
        self.scopes = ScopeAllocator::new();
        self.graph.replace(graph)
    }

    /// Detach and return the host graph.
    pub fn detach(&mut self) -> Option<G> {
        self.scopes = ScopeAllocator::new();
        self.graph.take()
    }

    /// Get an optional reference to the host graph.
    #[must_use]
    pub fn graph_opt(&self) -> Option<&G> {
        self.graph.as_ref()
    }

    /// Get the host graph or fail with `NoHostGraph`.
    pub fn graph(&self) -> Result<&G, GraftError> {
        self.graph.as_ref().ok_or(GraftError::NoHostGraph)
    }

    /// Get the host graph mutably or fail with `NoHostGraph`.
    pub fn graph_mut(&mut self) -> Result<&mut G, GraftError> {
        self.graph.as_mut().ok_or(GraftError::NoHostGraph)
    }

    /// Allocate a fresh import scope in the host graph.
    pub fn allocate_scope(&mut self, base: &str) -> Result<String, GraftError> {
        let graph = self.graph.as_ref().ok_or(GraftError::NoHostGraph)?;
        self.scopes.allocate(base, graph)
    }

    /// The scope allocator of the attached graph.
    #[must_use]
    pub fn scopes(&self) -> &ScopeAllocator {
        &self.scopes
    }

    /// Register an asset file to be bundled by the next freeze.
    pub fn register_asset(&mut self, path: impl AsRef<Path>) {
        self.assets.push(path.as_ref().to_path_buf());
    }

    /// Registered asset files.
    #[must_use]
    pub fn assets(&self) -> &[PathBuf] {
        &self.assets
    }
}

// =============================================================================
// TESTS
// =============================================================================
