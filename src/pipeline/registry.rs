//! Extension-based pipeline routing.

use std::path::Path;
use std::sync::Arc;

use super::{CopyPipeline, HtmlPipeline, MarkdownPipeline, Pipeline, extension_of};
use crate::log;
use crate::pipeline::Convert;

struct Claim {
    pipeline: Arc<dyn Pipeline>,
    extensions: Vec<String>,
}

/// Routes a path to the pipeline that handles it.
///
/// Precedence: built-in markdown for `.md`, built-in html for `.html`,
/// then the first registered pipeline claiming the extension, then copy.
pub struct PipelineRegistry {
    markdown: Option<Arc<dyn Pipeline>>,
    html: Option<Arc<dyn Pipeline>>,
    copy: Arc<dyn Pipeline>,
    claims: Vec<Claim>,
}

impl PipelineRegistry {
    /// Registry with only the copy fallback.
    pub fn new() -> Self {
        Self {
            markdown: None,
            html: None,
            copy: Arc::new(CopyPipeline),
            claims: Vec::new(),
        }
    }

    /// Markdown, html and copy built-ins.
    pub fn with_builtins(converter: Arc<dyn Convert>) -> Self {
        Self::new()
            .markdown(Arc::new(MarkdownPipeline::new(converter)))
            .html(Arc::new(HtmlPipeline))
    }

    pub fn markdown(mut self, pipeline: Arc<dyn Pipeline>) -> Self {
        self.markdown = Some(pipeline);
        self
    }

    pub fn html(mut self, pipeline: Arc<dyn Pipeline>) -> Self {
        self.html = Some(pipeline);
        self
    }

    /// Register a pipeline for `extensions` (with or without leading dot).
    ///
    /// Extensions another registered pipeline already claimed are dropped
    /// with a warning. Returns how many extensions were accepted.
    pub fn register(&mut self, pipeline: Arc<dyn Pipeline>, extensions: &[String]) -> usize {
        let mut accepted = Vec::new();
        for ext in extensions {
            let ext = ext.trim_start_matches('.').to_owned();
            if ext.is_empty() || accepted.contains(&ext) {
                continue;
            }
            if let Some(owner) = self.claimant(&ext) {
                log!("warning"; "pipeline `{}` cannot claim .{ext}: already handled by `{}`", pipeline.name(), owner.name());
                continue;
            }
            if self.is_builtin(&ext) {
                log!("warning"; "pipeline `{}` claims .{ext}, which the built-in pipeline handles first", pipeline.name());
            }
            accepted.push(ext);
        }

        let count = accepted.len();
        if count > 0 {
            self.claims.push(Claim {
                pipeline,
                extensions: accepted,
            });
        }
        count
    }

    /// Pipeline for `path`.
    pub fn route(&self, path: &Path) -> &Arc<dyn Pipeline> {
        let ext = extension_of(path);
        let builtin = match ext {
            Some("md") => self.markdown.as_ref(),
            Some("html") => self.html.as_ref(),
            _ => None,
        };
        builtin
            .or_else(|| ext.and_then(|e| self.claimant(e)))
            .unwrap_or(&self.copy)
    }

    /// Names of all reachable pipelines, built-ins first.
    pub fn names(&self) -> Vec<&str> {
        self.markdown
            .iter()
            .chain(self.html.iter())
            .chain(std::iter::once(&self.copy))
            .chain(self.claims.iter().map(|c| &c.pipeline))
            .map(|p| p.name())
            .collect()
    }

    /// Number of plugin-registered pipelines.
    pub fn claimed(&self) -> usize {
        self.claims.len()
    }

    fn claimant(&self, ext: &str) -> Option<&Arc<dyn Pipeline>> {
        self.claims
            .iter()
            .find(|c| c.extensions.iter().any(|e| e == ext))
            .map(|c| &c.pipeline)
    }

    fn is_builtin(&self, ext: &str) -> bool {
        (ext == "md" && self.markdown.is_some()) || (ext == "html" && self.html.is_some())
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::pipeline::{Asset, CmarkConverter};

    struct Named(&'static str);

    impl Pipeline for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn process(&self, asset: Asset) -> Result<Asset> {
            Ok(asset)
        }
    }

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn builtins() -> PipelineRegistry {
        PipelineRegistry::with_builtins(Arc::new(CmarkConverter::default()))
    }

    #[test]
    fn test_builtin_routing() {
        let registry = builtins();
        assert_eq!(registry.route(Path::new("a.md")).name(), "markdown");
        assert_eq!(registry.route(Path::new("a.html")).name(), "html");
        assert_eq!(registry.route(Path::new("a.png")).name(), "copy");
        assert_eq!(registry.route(Path::new("Makefile")).name(), "copy");
    }

    #[test]
    fn test_builtin_wins_over_plugin_claim() {
        let mut registry = builtins();
        registry.register(Arc::new(Named("sass")), &exts(&[".md", ".scss"]));
        assert_eq!(registry.route(Path::new("a.md")).name(), "markdown");
        assert_eq!(registry.route(Path::new("a.scss")).name(), "sass");
    }

    #[test]
    fn test_plugin_claim_without_builtins() {
        let mut registry = PipelineRegistry::new();
        registry.register(Arc::new(Named("mdx")), &exts(&["md"]));
        assert_eq!(registry.route(Path::new("a.md")).name(), "mdx");
    }

    #[test]
    fn test_first_claim_wins() {
        let mut registry = builtins();
        assert_eq!(registry.register(Arc::new(Named("one")), &exts(&[".ts"])), 1);
        assert_eq!(registry.register(Arc::new(Named("two")), &exts(&[".ts"])), 0);
        assert_eq!(registry.route(Path::new("a.ts")).name(), "one");
        assert_eq!(registry.claimed(), 1);
    }

    #[test]
    fn test_names() {
        let mut registry = builtins();
        registry.register(Arc::new(Named("sass")), &exts(&["scss"]));
        assert_eq!(registry.names(), vec!["markdown", "html", "copy", "sass"]);
    }
}
