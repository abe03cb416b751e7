//! Per-file processing: hooks, pipeline, layouts, output.

use serde_json::Value;
use std::path::{Path, PathBuf};

use super::CancelToken;
use crate::error::{BuildError, Result};
use crate::freshness::{Cache, RebuildSet};
use crate::layout::{LayoutResolver, TemplateCache};
use crate::output::{OutputMerger, WriteOutcome};
use crate::pipeline::{Asset, PipelineRegistry, extension_of};
use crate::plugin::{Capability, PluginHost};
use crate::template::RenderData;
use crate::utils::path::cache_key;

/// A selected file, already read by the producer.
#[derive(Debug)]
pub(super) struct Job {
    pub source: PathBuf,
    pub content: Vec<u8>,
}

/// What a job produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Processed {
    Page(WriteOutcome),
    Asset(WriteOutcome),
}

/// Progress counter a source file is reported under.
pub(super) fn counter_for(path: &Path) -> &'static str {
    match extension_of(path) {
        Some("md" | "html") => "pages",
        _ => "assets",
    }
}

/// Everything a worker needs to turn a source file into output.
pub struct Stage<'a> {
    pub root: &'a Path,
    pub content_dir: &'a Path,
    pub output_dir: &'a Path,
    pub site: &'a Value,
    pub registry: &'a PipelineRegistry,
    pub plugins: &'a PluginHost,
    pub layouts: &'a LayoutResolver,
    pub templates: &'a TemplateCache,
    pub merger: OutputMerger,
    pub cache: &'a Cache,
    pub rebuild: &'a RebuildSet,
}

impl Stage<'_> {
    /// Run one file through every stage and commit its fingerprint.
    pub(super) fn process(&self, job: Job, cancel: &CancelToken) -> Result<Processed> {
        let Job { source, content } = job;
        let key = cache_key(self.root, &source);

        let content = self
            .plugins
            .content_hook(Capability::ContentLoaded, &key, content)?;
        cancel.check()?;

        let pipeline = self.registry.route(&source);
        let mut asset = Asset::new(&source, content);
        asset = pipeline.process(asset)?;
        cancel.check()?;

        let processed = if asset.is_html() {
            let (path, html) = self.render(&key, asset)?;
            cancel.check()?;
            let dest = self.output_path(&source, &path)?;
            Processed::Page(self.merger.write(&dest, &html)?)
        } else {
            cancel.check()?;
            let dest = self.output_path(&source, &asset.path)?;
            Processed::Asset(self.merger.copy(&dest, &asset.content)?)
        };

        self.rebuild.commit(self.cache, &source);
        Ok(processed)
    }

    /// Body partials, layout chain, then the rendered-HTML hook.
    fn render(&self, key: &str, asset: Asset) -> Result<(PathBuf, Vec<u8>)> {
        let Asset {
            source,
            path,
            content,
            metadata,
        } = asset;

        let body = self
            .plugins
            .content_hook(Capability::ContentRender, key, content)?;
        let body = String::from_utf8(body)
            .map_err(|e| BuildError::parse(&source, format!("not valid UTF-8: {e}")))?;

        let page = Value::Object(metadata);
        let data = RenderData::new(self.site, &page, "");
        let body = self.templates.render_body(&source, &body, data)?;

        let chain = self.layouts.layouts(&source);
        let html = self
            .templates
            .render_page(&chain, data.with_content(&body))?;

        let html = self
            .plugins
            .content_hook(Capability::HtmlRendered, key, html.into_bytes())?;
        Ok((path, html))
    }

    /// Mirror a content path into the output directory.
    fn output_path(&self, source: &Path, path: &Path) -> Result<PathBuf> {
        let rel = path.strip_prefix(self.content_dir).map_err(|_| {
            BuildError::parse(
                source,
                format!("output path `{}` is outside the content directory", path.display()),
            )
        })?;
        Ok(self.output_dir.join(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::CmarkConverter;
    use crate::template::TemplateSet;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        registry: PipelineRegistry,
        plugins: PluginHost,
        layouts: LayoutResolver,
        templates: TemplateCache,
        cache: Cache,
        rebuild: RebuildSet,
        site: Value,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            fs::create_dir_all(dir.path().join("content")).unwrap();
            Self {
                registry: PipelineRegistry::with_builtins(Arc::new(CmarkConverter::default())),
                plugins: PluginHost::empty(),
                layouts: LayoutResolver::new(dir.path().join("content")),
                templates: TemplateCache::new(TemplateSet::new()),
                cache: Cache::new(dir.path().join("dist/.cache")),
                rebuild: RebuildSet::default(),
                site: serde_json::json!({ "Name": "Site" }),
                dir,
            }
        }

        fn content(&self) -> PathBuf {
            self.dir.path().join("content")
        }

        fn output(&self) -> PathBuf {
            self.dir.path().join("dist")
        }

        fn run(&self, rel: &str, body: &str) -> Result<Processed> {
            let content_dir = self.content();
            let output_dir = self.output();
            let stage = Stage {
                root: self.dir.path(),
                content_dir: &content_dir,
                output_dir: &output_dir,
                site: &self.site,
                registry: &self.registry,
                plugins: &self.plugins,
                layouts: &self.layouts,
                templates: &self.templates,
                merger: OutputMerger::default(),
                cache: &self.cache,
                rebuild: &self.rebuild,
            };
            let source = content_dir.join(rel);
            fs::create_dir_all(source.parent().unwrap()).unwrap();
            fs::write(&source, body).unwrap();
            let job = Job {
                source,
                content: body.as_bytes().to_vec(),
            };
            stage.process(job, &CancelToken::new())
        }
    }

    #[test]
    fn test_markdown_page_with_layout() {
        let fx = Fixture::new();
        fs::write(
            fx.content().join("_layout.html"),
            "<main>{{ .Page.title }}|{{ .Content }}</main>",
        )
        .unwrap();

        let out = fx.run("post.md", "---\ntitle: Hi\n---\nbody").unwrap();
        assert_eq!(out, Processed::Page(WriteOutcome::Created));
        let html = fs::read_to_string(fx.output().join("post.html")).unwrap();
        assert_eq!(html, "<main>Hi|<p>body</p>\n</main>");
    }

    #[test]
    fn test_default_layout_when_none_exist() {
        let fx = Fixture::new();
        fx.run("index.html", "<p>x</p>").unwrap();
        let html = fs::read_to_string(fx.output().join("index.html")).unwrap();
        assert!(html.contains("<p>x</p>"));
        assert!(html.contains("Site"));
    }

    #[test]
    fn test_asset_copied_verbatim() {
        let fx = Fixture::new();
        let out = fx.run("img/logo.svg", "<svg/>").unwrap();
        assert_eq!(out, Processed::Asset(WriteOutcome::Created));
        assert_eq!(fs::read_to_string(fx.output().join("img/logo.svg")).unwrap(), "<svg/>");
        assert_eq!(fx.run("img/logo.svg", "<svg/>").unwrap(), Processed::Asset(WriteOutcome::Unchanged));
    }

    #[test]
    fn test_canceled_job_writes_nothing() {
        let fx = Fixture::new();
        let content_dir = fx.content();
        let output_dir = fx.output();
        let stage = Stage {
            root: fx.dir.path(),
            content_dir: &content_dir,
            output_dir: &output_dir,
            site: &fx.site,
            registry: &fx.registry,
            plugins: &fx.plugins,
            layouts: &fx.layouts,
            templates: &fx.templates,
            merger: OutputMerger::default(),
            cache: &fx.cache,
            rebuild: &fx.rebuild,
        };
        let cancel = CancelToken::new();
        cancel.cancel();

        let job = Job {
            source: content_dir.join("a.md"),
            content: b"# a".to_vec(),
        };
        assert!(matches!(stage.process(job, &cancel), Err(BuildError::Canceled)));
        assert!(!output_dir.join("a.html").exists());
    }

    #[test]
    fn test_counter_for() {
        assert_eq!(counter_for(Path::new("a.md")), "pages");
        assert_eq!(counter_for(Path::new("a.html")), "pages");
        assert_eq!(counter_for(Path::new("a.css")), "assets");
        assert_eq!(counter_for(Path::new("Makefile")), "assets");
    }
}
