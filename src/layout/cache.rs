//! Parsed template sets per layout chain.

use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{DEFAULT_LAYOUT, DEFAULT_LAYOUT_SOURCE};
use crate::error::{BuildError, Result};
use crate::template::{RenderData, Template, TemplateSet};

/// Caches a template set (partials + layouts) for each distinct chain.
///
/// Two workers missing on the same chain may both parse it; the first
/// insert wins and both results are equivalent.
#[derive(Debug)]
pub struct TemplateCache {
    base: TemplateSet,
    sets: DashMap<String, Arc<TemplateSet>>,
}

impl TemplateCache {
    /// `base` holds the partials every layout may include.
    pub fn new(base: TemplateSet) -> Self {
        Self {
            base,
            sets: DashMap::new(),
        }
    }

    /// Template set for `chain`, parsing the layouts on first use.
    pub fn get(&self, chain: &[PathBuf]) -> Result<Arc<TemplateSet>> {
        let key = chain_key(chain);
        if let Some(set) = self.sets.get(&key) {
            return Ok(Arc::clone(set.value()));
        }

        let mut set = self.base.clone();
        if chain.is_empty() {
            let layout = Template::parse(DEFAULT_LAYOUT, DEFAULT_LAYOUT_SOURCE)
                .map_err(|e| BuildError::template(DEFAULT_LAYOUT, e))?;
            set.insert(layout);
        }
        for path in chain {
            let source = fs::read_to_string(path).map_err(|e| BuildError::io("read", path, e))?;
            let layout = Template::parse(layout_name(path), &source)
                .map_err(|e| BuildError::template(path, e))?;
            set.insert(layout);
        }

        let set = Arc::new(set);
        let entry = self.sets.entry(key).or_insert(set);
        Ok(Arc::clone(entry.value()))
    }

    /// Render `data.content` through every layout of `chain`, innermost
    /// first, each output becoming the next layout's `.Content`.
    pub fn render_page(&self, chain: &[PathBuf], data: RenderData<'_>) -> Result<String> {
        let set = self.get(chain)?;
        if chain.is_empty() {
            return set
                .render(DEFAULT_LAYOUT, &data)
                .map_err(|e| BuildError::template(DEFAULT_LAYOUT, e));
        }

        let mut body = data.content.to_owned();
        for path in chain.iter().rev() {
            body = set
                .render(&layout_name(path), &data.with_content(&body))
                .map_err(|e| BuildError::template(path, e))?;
        }
        Ok(body)
    }

    /// Expand the partial markers of a content body against the shared
    /// partials. The body itself is never parsed as a template.
    pub fn render_body(&self, source: &Path, body: &str, data: RenderData<'_>) -> Result<String> {
        self.base
            .expand_partials(body, &data)
            .map_err(|e| BuildError::template(source, e))
    }

    pub fn base(&self) -> &TemplateSet {
        &self.base
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

fn chain_key(chain: &[PathBuf]) -> String {
    if chain.is_empty() {
        return DEFAULT_LAYOUT.to_owned();
    }
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Layouts share a file name, so they are registered under their full path.
fn layout_name(path: &Path) -> String {
    path.display().to_string()
}
