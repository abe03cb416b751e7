//! Rebuild selection: graph + cache → the set of files to render.

use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use super::{Cache, fingerprint_file};
use crate::debug;
use crate::error::{BuildError, Result};
use crate::graph::{DependencyGraph, NodeId};
use crate::layout::LAYOUT_FILE;
use crate::utils::path::cache_key;

/// How far a changed partial propagates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fanout {
    /// Only files that include the partial themselves.
    Direct,
    /// Everything that reaches the partial through nested includes.
    #[default]
    Transitive,
}

/// Files selected for rebuilding, plus fingerprints waiting to be committed.
///
/// Fingerprints of changed files are staged rather than written straight
/// into the cache: a file only counts as built once it has been processed,
/// so a failed build re-selects it next time.
#[derive(Debug, Default)]
pub struct RebuildSet {
    paths: FxHashSet<PathBuf>,
    staged: Mutex<FxHashMap<PathBuf, (String, String)>>,
}

impl RebuildSet {
    #[inline]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    /// Commit the staged fingerprint of a processed file.
    pub fn commit(&self, cache: &Cache, path: &Path) {
        if let Some((key, fingerprint)) = self.staged.lock().remove(path) {
            cache.set(key, fingerprint);
        }
    }

    /// Commit everything still staged (partials, layouts, skipped files).
    ///
    /// Only called once every selected file has been processed.
    pub fn commit_remaining(&self, cache: &Cache) {
        for (_, (key, fingerprint)) in self.staged.lock().drain() {
            cache.set(key, fingerprint);
        }
    }

    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }
}

/// Combines the dependency graph and the cache into a [`RebuildSet`].
pub struct RebuildSelector<'a> {
    graph: &'a DependencyGraph,
    cache: &'a Cache,
    root: &'a Path,
    content_dir: &'a Path,
    partials_dir: &'a Path,
    fanout: Fanout,
}

impl<'a> RebuildSelector<'a> {
    pub fn new(
        graph: &'a DependencyGraph,
        cache: &'a Cache,
        root: &'a Path,
        content_dir: &'a Path,
        partials_dir: &'a Path,
    ) -> Self {
        Self {
            graph,
            cache,
            root,
            content_dir,
            partials_dir,
            fanout: Fanout::default(),
        }
    }

    pub fn fanout(mut self, fanout: Fanout) -> Self {
        self.fanout = fanout;
        self
    }

    /// Fingerprint every node and decide what to rebuild.
    ///
    /// Vanished files are skipped silently. Unchanged files are written
    /// back to the cache right away; changed ones are staged.
    pub fn select(&self) -> Result<RebuildSet> {
        let fingerprints: Vec<(NodeId, Option<String>)> = self
            .graph
            .nodes()
            .par_iter()
            .enumerate()
            .map(|(id, node)| match fingerprint_file(&node.path) {
                Ok(fp) => Ok((id, Some(fp.to_hex()))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok((id, None)),
                Err(e) => Err(BuildError::io("fingerprint", &node.path, e)),
            })
            .collect::<Result<_>>()?;

        let mut set = RebuildSet::default();
        let staged = set.staged.get_mut();

        for (id, fingerprint) in fingerprints {
            let Some(fingerprint) = fingerprint else {
                continue;
            };
            let path = self.graph.path(id);
            let key = cache_key(self.root, path);

            if self.cache.get(&key).as_deref() == Some(fingerprint.as_str()) {
                self.cache.set(key, fingerprint);
                continue;
            }

            debug!("select"; "changed: {key}");
            staged.insert(path.to_path_buf(), (key, fingerprint));
            self.mark(&mut set.paths, path);

            if path.starts_with(self.partials_dir) {
                for dependent in self.partial_dependents(id) {
                    self.mark(&mut set.paths, self.graph.path(dependent));
                }
            }
        }

        debug!("select"; "{} of {} files selected", set.len(), self.graph.len());
        Ok(set)
    }

    /// Select `path`. A layout inside the content tree pulls in every
    /// content file of its subtree, since layouts are never rendered alone.
    fn mark(&self, paths: &mut FxHashSet<PathBuf>, path: &Path) {
        paths.insert(path.to_path_buf());
        if is_layout(path)
            && let Some(scope) = path.parent()
            && scope.starts_with(self.content_dir)
        {
            for node in self.graph.nodes() {
                if node.path.starts_with(scope) {
                    paths.insert(node.path.clone());
                }
            }
        }
    }

    fn partial_dependents(&self, id: NodeId) -> Vec<NodeId> {
        match self.fanout {
            Fanout::Direct => self.graph.get_dependents(id),
            Fanout::Transitive => self.graph.dependents_closure(id),
        }
    }
}

fn is_layout(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name == LAYOUT_FILE)
}
