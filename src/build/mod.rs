//! Site building orchestration.
//!
//! Build phases:
//! - **Plugins** - discover, `OnPreBuild`, `OnConfigLoaded`
//! - **Public** - mirror `public/` into the output, `OnPublicAssetsCopied`
//! - **Select** - dependency graph + content hashes → files to rebuild
//! - **Schedule** - render the selection on the worker pool
//! - **Finalize** - commit and persist the cache, `OnPostBuild`
//!
//! The cache is saved whether or not scheduling succeeded, so work that
//! finished before a failure is not redone.

mod public;

use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{SitePaths, SiteConfig};
use crate::error::{BuildError, Result};
use crate::freshness::{CACHE_FILE, Cache, RebuildSelector};
use crate::graph::DependencyGraph;
use crate::layout::{LayoutResolver, TemplateCache};
use crate::output::OutputMerger;
use crate::pipeline::{CmarkConverter, PipelineRegistry};
use crate::plugin::PluginHost;
use crate::scheduler::{CancelToken, ScheduleStats, Scheduler, Stage};
use crate::template::TemplateSet;
use crate::utils::path::resolve_path;
use crate::utils::plural_count;
use crate::{debug, log};

/// Per-invocation options; `None` falls back to the config file.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Output directory, relative to the project root unless absolute.
    pub output: Option<PathBuf>,
    /// Discard the cache before building.
    pub clean: bool,
    /// Worker threads. Zero is rejected.
    pub workers: Option<usize>,
    /// No progress line or summary.
    pub quiet: bool,
}

/// What a build did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Files known to the dependency graph (content and partials).
    pub tracked: usize,
    /// Files selected for rebuilding.
    pub selected: usize,
    /// Public files written.
    pub public: usize,
    pub plugins: usize,
    pub stats: ScheduleStats,
}

/// Build the site described by `config`.
pub fn build(config: &SiteConfig, options: &BuildOptions) -> Result<BuildReport> {
    build_with_cancel(config, options, &CancelToken::new())
}

/// Build the site, stopping early once `cancel` fires.
pub fn build_with_cancel(
    config: &SiteConfig,
    options: &BuildOptions,
    cancel: &CancelToken,
) -> Result<BuildReport> {
    let started = Instant::now();
    let workers = options
        .workers
        .unwrap_or_else(|| config.build.worker_count());
    if workers == 0 {
        return Err(BuildError::Config("workers must be at least 1".into()));
    }

    let mut paths = config.paths();
    if let Some(output) = &options.output {
        paths.output = resolve_path(output, &paths.root);
    }
    let cache_path = paths.output.join(CACHE_FILE);
    if options.clean {
        debug!("build"; "removing {}", cache_path.display());
        Cache::remove_file(&cache_path)?;
    }

    let plugins = PluginHost::discover(&config.plugin_config().cancel_on(cancel));
    let report = run(config, &paths, &plugins, workers, options, cancel)?;
    plugins.post_build()?;
    plugins.shutdown();

    if !options.quiet {
        let stats = &report.stats;
        log!(
            "build";
            "{} of {} selected: {} rendered, {} copied, {} unchanged",
            report.selected,
            plural_count(report.tracked, "file"),
            stats.rendered,
            stats.copied,
            stats.unchanged
        );
        log!("done"; "built in {:.2?}", started.elapsed());
    }
    Ok(report)
}

fn run(
    config: &SiteConfig,
    paths: &SitePaths,
    plugins: &PluginHost,
    workers: usize,
    options: &BuildOptions,
    cancel: &CancelToken,
) -> Result<BuildReport> {
    plugins.pre_build()?;
    let site = load_site(config, plugins)?;

    fs::create_dir_all(&paths.output).map_err(|e| BuildError::io("create", &paths.output, e))?;
    let public = public::copy_public(&paths.public, &paths.output)?;
    debug!("build"; "{} written from public", plural_count(public, "file"));
    plugins.public_assets_copied()?;
    cancel.check()?;

    let cache = Cache::open(paths.output.join(CACHE_FILE))?;
    let templates = TemplateCache::new(TemplateSet::from_dir(&paths.partials)?);

    let mut registry =
        PipelineRegistry::with_builtins(Arc::new(CmarkConverter::new(&config.markdown)));
    plugins.register_pipelines(&mut registry, &paths.root, &paths.content)?;
    debug!("build"; "pipelines: {}", registry.names().join(", "));

    let graph = DependencyGraph::build(&paths.content, &paths.partials)?;
    let rebuild = RebuildSelector::new(&graph, &cache, &paths.root, &paths.content, &paths.partials)
        .fanout(config.build.fanout)
        .select()?;

    let layouts = LayoutResolver::new(&paths.content);
    let stage = Stage {
        root: &paths.root,
        content_dir: &paths.content,
        output_dir: &paths.output,
        site: &site,
        registry: &registry,
        plugins,
        layouts: &layouts,
        templates: &templates,
        merger: OutputMerger::new(config.build.output_mode),
        cache: &cache,
        rebuild: &rebuild,
    };
    let scheduled = Scheduler::new(stage, workers)
        .progress(!options.quiet)
        .run(cancel);

    if scheduled.is_ok() {
        rebuild.commit_remaining(&cache);
    }
    // The scheduling error wins over a failed save.
    let saved = cache.save();
    let stats = scheduled?;
    saved?;

    Ok(BuildReport {
        tracked: graph.len(),
        selected: rebuild.len(),
        public,
        plugins: plugins.len(),
        stats,
    })
}

/// `[site]` after every config-loaded hook has had its say.
fn load_site(config: &SiteConfig, plugins: &PluginHost) -> Result<Value> {
    let bytes = plugins.config_loaded(config.site_json())?;
    serde_json::from_slice(&bytes).map_err(|e| {
        BuildError::parse(
            &config.config_path,
            format!("plugins returned invalid site config: {e}"),
        )
    })
}

#[cfg(test)]
mod tests;
