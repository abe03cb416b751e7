//! Layout and partial templates.
//!
//! A renderer for the Go-style actions layouts use: the page body, front
//! matter and site fields, and named includes. Anything else is a parse
//! error. Content bodies are not templates; only their partial markers are
//! expanded (see [`TemplateSet::expand_partials`]).
//!
//! # Example
//!
//! ```ignore
//! let mut set = TemplateSet::new();
//! set.add("nav.html", "<nav>{{ .Site.title }}</nav>")?;
//! set.add("layout", r#"{{ partial "nav.html" }}{{ .Content }}"#)?;
//! let html = set.render("layout", &RenderData::new(&site, &page, "<p>hi</p>"))?;
//! ```

mod parse;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

use crate::error::{BuildError, Result};
use crate::utils::path::cache_key;
use crate::utils::walk::collect_files;
use parse::{Root, Segment};

/// Nested includes deeper than this are treated as recursion.
pub const MAX_INCLUDE_DEPTH: usize = 32;

/// `{{ partial "name" }}`, quotes optionally HTML-escaped by the Markdown
/// converter. Shared with the dependency graph so both see the same includes.
pub const PARTIAL_MARKER: &str = r#"\{\{\s*partial\s+(?:"|&quot;)([^"&]+)(?:"|&quot;)\s*\}\}"#;

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PARTIAL_MARKER).expect("partial marker regex is valid"));

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template `{template}`: {message}")]
    Syntax { template: String, message: String },

    #[error("no template named \"{0}\"")]
    Missing(String),

    #[error("template \"{0}\" exceeds the include depth limit")]
    Recursion(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        let segments = parse::parse(&name, source)?;
        Ok(Self { name, segments })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Values visible to a template.
#[derive(Debug, Clone, Copy)]
pub struct RenderData<'a> {
    pub site: &'a Value,
    pub page: &'a Value,
    /// Inserted unescaped.
    pub content: &'a str,
}

impl<'a> RenderData<'a> {
    pub const fn new(site: &'a Value, page: &'a Value, content: &'a str) -> Self {
        Self {
            site,
            page,
            content,
        }
    }

    /// Same data with a different body.
    pub fn with_content(self, content: &'a str) -> Self {
        Self { content, ..self }
    }
}

/// Named templates that can include each other.
///
/// Cloning is cheap: templates are shared behind `Arc`.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: FxHashMap<String, Arc<Template>>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file under `dir`, named by its `/`-separated relative path.
    ///
    /// A missing directory yields an empty set.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut set = Self::new();
        for path in collect_files(dir)? {
            let source = fs::read_to_string(&path).map_err(|e| BuildError::io("read", &path, e))?;
            let name = cache_key(dir, &path);
            set.add(name, &source)
                .map_err(|e| BuildError::template(&path, e))?;
        }
        Ok(set)
    }

    pub fn add(&mut self, name: impl Into<String>, source: &str) -> Result<(), TemplateError> {
        let template = Template::parse(name, source)?;
        self.insert(template);
        Ok(())
    }

    pub fn insert(&mut self, template: Template) {
        self.templates
            .insert(template.name.clone(), Arc::new(template));
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Render a named template.
    pub fn render(&self, name: &str, data: &RenderData<'_>) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_into(self.named(name)?, data, &mut out, 0)?;
        Ok(out)
    }

    /// Replace every partial marker in `text` with the rendered partial.
    ///
    /// Any other `{{ ... }}` is left exactly as written, so prose and code
    /// samples that mention template syntax pass through untouched.
    pub fn expand_partials(&self, text: &str, data: &RenderData<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in MARKER.captures_iter(text) {
            let (Some(marker), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&text[last..marker.start()]);
            self.render_into(self.named(name.as_str())?, data, &mut out, 1)?;
            last = marker.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn named(&self, name: &str) -> Result<&Template, TemplateError> {
        self.templates
            .get(name)
            .map(Arc::as_ref)
            .ok_or_else(|| TemplateError::Missing(name.to_owned()))
    }

    fn render_into(
        &self,
        template: &Template,
        data: &RenderData<'_>,
        out: &mut String,
        depth: usize,
    ) -> Result<(), TemplateError> {
        for segment in &template.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Content => out.push_str(data.content),
                Segment::Field { root, path } => {
                    let base = match root {
                        Root::Site => data.site,
                        Root::Page => data.page,
                    };
                    if let Some(value) = lookup(base, path) {
                        push_escaped(out, &display(value));
                    }
                }
                Segment::Include(name) => {
                    if depth >= MAX_INCLUDE_DEPTH {
                        return Err(TemplateError::Recursion(name.clone()));
                    }
                    self.render_into(self.named(name)?, data, out, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

/// Walk `path` through nested objects. Keys match exactly first, then
/// case-insensitively (`.Site.Title` finds `title`).
fn lookup<'v>(value: &'v Value, path: &[String]) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, key| {
        let map = current.as_object()?;
        map.get(key).or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    })
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
