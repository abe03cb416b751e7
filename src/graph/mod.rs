//! Dependency tracking for incremental builds.
//!
//! Content files (and partials) point at the partials they include through
//! `{{ partial "name" }}` markers. The graph is rebuilt from scratch every
//! build; it is never persisted.
//!
//! Nodes live in an arena owned by [`DependencyGraph`]; edges are plain
//! [`NodeId`] indices, so there are no shared-ownership cycles.

use regex::bytes::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::debug;
use crate::error::{BuildError, Result};
use crate::template;
use crate::utils::walk::collect_files;

/// Index of a node inside its graph.
pub type NodeId = usize;

static PARTIAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(template::PARTIAL_MARKER).expect("partial marker regex is valid"));

/// A file in the graph and the partials it includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub path: PathBuf,
    /// Ordered, deduplicated.
    pub dependencies: Vec<NodeId>,
}

/// Arena-backed dependency graph.
///
/// # Invariants
/// - Every path maps to exactly one node
/// - Edge lists contain no duplicates and no self edges
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Node>,
    index: FxHashMap<PathBuf, NodeId>,
}

impl DependencyGraph {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk `content_dir`, scan every file (and every partial it reaches)
    /// for partial markers, and link them.
    ///
    /// A referenced partial that does not exist keeps its node but is not
    /// scanned; the rebuild selector skips it.
    pub fn build(content_dir: &Path, partials_dir: &Path) -> Result<Self> {
        let mut graph = Self::new();
        let mut pending: VecDeque<NodeId> = collect_files(content_dir)?
            .into_iter()
            .map(|path| graph.add_node(path))
            .collect();
        let mut scanned = FxHashSet::default();

        while let Some(id) = pending.pop_front() {
            if !scanned.insert(id) {
                continue;
            }

            let path = graph.nodes[id].path.clone();
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BuildError::io("read", &path, e)),
            };

            for name in scan_partials(&bytes) {
                let partial = graph.add_node(partials_dir.join(&name));
                graph.add_edge(id, partial);
                if !scanned.contains(&partial) {
                    pending.push_back(partial);
                }
            }
        }

        debug!("graph"; "{} nodes, {} edges", graph.len(), graph.edge_count());
        Ok(graph)
    }

    /// Insert a node for `path` unless one exists.
    pub fn add_node(&mut self, path: impl Into<PathBuf>) -> NodeId {
        let path = path.into();
        if let Some(&id) = self.index.get(&path) {
            return id;
        }
        let id = self.nodes.len();
        self.index.insert(path.clone(), id);
        self.nodes.push(Node {
            path,
            dependencies: Vec::new(),
        });
        id
    }

    /// Record that `from` includes `to`.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if from == to {
            return;
        }
        let deps = &mut self.nodes[from].dependencies;
        if !deps.contains(&to) {
            deps.push(to);
        }
    }

    #[inline]
    pub fn get(&self, path: &Path) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn path(&self, id: NodeId) -> &Path {
        &self.nodes[id].path
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.dependencies.len()).sum()
    }

    /// Nodes that include `id` directly.
    ///
    /// Linear scan over every edge list, O(V·E). A reverse index would make
    /// this O(1) if sites ever get large enough to notice.
    pub fn get_dependents(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.dependencies.contains(&id))
            .map(|(i, _)| i)
            .collect()
    }

    /// Every node that reaches `id` through one or more includes.
    pub fn dependents_closure(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.get_dependents(current) {
                if dependent != id && seen.insert(dependent) {
                    order.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }

        order
    }
}

/// Partial names referenced by `bytes`, in order of appearance.
pub fn scan_partials(bytes: &[u8]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PARTIAL_MARKER.captures_iter(bytes) {
        let name = String::from_utf8_lossy(&caps[1]).into_owned();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}
