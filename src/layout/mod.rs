//! Layout lookup and rendering.
//!
//! A content file is wrapped by every `_layout.html` between its directory
//! and the content root. Files with no layout get the built-in one.

mod cache;

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use cache::TemplateCache;

/// Layout file name looked up in each content directory.
pub const LAYOUT_FILE: &str = "_layout.html";

/// Template name of the built-in layout.
pub const DEFAULT_LAYOUT: &str = "default";

/// Built-in layout used when a file has no `_layout.html` above it.
pub const DEFAULT_LAYOUT_SOURCE: &str = "<!DOCTYPE html>
<html>
<head>
	<title>{{ .Site.Name }}</title>
</head>
<body>
	{{ .Content }}
</body>
</html>
";

/// Layout files wrapping a path, outermost first.
///
/// Empty means the built-in layout.
pub type LayoutChain = Arc<[PathBuf]>;

/// Finds layout chains, cached per directory for one build.
#[derive(Debug)]
pub struct LayoutResolver {
    content_dir: PathBuf,
    cache: DashMap<PathBuf, LayoutChain>,
}

impl LayoutResolver {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            cache: DashMap::new(),
        }
    }

    /// Layouts for `path`: each `_layout.html` from the file's directory up
    /// to the content root, outermost first.
    pub fn layouts(&self, path: &Path) -> LayoutChain {
        let dir = path.parent().unwrap_or(Path::new(""));
        if let Some(chain) = self.cache.get(dir) {
            return Arc::clone(chain.value());
        }

        let mut layouts = Vec::new();
        let mut current = Some(dir);
        while let Some(d) = current {
            let candidate = d.join(LAYOUT_FILE);
            if candidate.is_file() {
                layouts.push(candidate);
            }
            if d == self.content_dir || !d.starts_with(&self.content_dir) {
                break;
            }
            current = d.parent();
        }
        layouts.reverse();

        let chain: LayoutChain = layouts.into();
        self.cache.insert(dir.to_path_buf(), Arc::clone(&chain));
        chain
    }

    /// Number of cached directories.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
