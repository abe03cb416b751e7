//! Asset processing pipelines.
//!
//! Every file selected for rebuilding is routed to exactly one [`Pipeline`]:
//!
//! ```text
//! .md    → markdown   front matter + Markdown → HTML, renamed to .html
//! .html  → html       passthrough (layouts applied by the scheduler)
//! .ext   → plugin     first plugin pipeline that claimed the extension
//! *      → copy       bytes written verbatim
//! ```
//!
//! Built-ins and plugin adapters share the same trait object type.

mod builtin;
mod markdown;
mod plugin;
mod registry;

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

pub use builtin::{CopyPipeline, HtmlPipeline};
pub use markdown::{CmarkConverter, Convert, MarkdownOptions, MarkdownPipeline, split_front_matter};
pub use plugin::PluginPipeline;
pub use registry::PipelineRegistry;

/// Front matter and anything plugins attach.
pub type Metadata = Map<String, Value>;

/// A file moving through the pipeline. Owned by one stage at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    /// File the asset was read from.
    pub source: PathBuf,
    /// Current path; pipelines may rename it (`a.md` → `a.html`).
    pub path: PathBuf,
    pub content: Vec<u8>,
    pub metadata: Metadata,
}

impl Asset {
    pub fn new(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            path,
            content,
            metadata: Metadata::new(),
        }
    }

    #[inline]
    pub fn extension(&self) -> Option<&str> {
        extension_of(&self.path)
    }

    #[inline]
    pub fn is_html(&self) -> bool {
        self.extension() == Some("html")
    }

    /// Content as UTF-8, or a parse error naming the source file.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.content)
            .map_err(|e| BuildError::parse(&self.source, format!("not valid UTF-8: {e}")))
    }
}

/// A processing stage.
pub trait Pipeline: Send + Sync {
    /// Identity used for logging and plugin routing.
    fn name(&self) -> &str;

    /// Transform an asset. Pipelines ignore assets they do not handle.
    fn process(&self, asset: Asset) -> Result<Asset>;
}

#[inline]
pub(crate) fn extension_of(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}
