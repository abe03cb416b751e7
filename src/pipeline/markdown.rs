//! Markdown pipeline: front matter + pulldown-cmark.

use pulldown_cmark::{Options, Parser, html};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{Asset, Metadata, Pipeline};
use crate::error::{BuildError, Result};

/// Markdown → HTML conversion.
pub trait Convert: Send + Sync {
    fn convert(&self, markdown: &str) -> String;
}

/// Options for markdown conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownOptions {
    /// Enable tables extension
    pub tables: bool,
    /// Enable footnotes extension
    pub footnotes: bool,
    /// Enable strikethrough extension
    pub strikethrough: bool,
    /// Enable task lists extension
    pub task_lists: bool,
    /// Enable heading attributes extension (e.g., `# Heading {#custom-id}`)
    pub heading_attributes: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            tables: true,
            footnotes: true,
            strikethrough: true,
            task_lists: true,
            heading_attributes: false,
        }
    }
}

impl MarkdownOptions {
    /// Create options with all extensions enabled
    pub fn all() -> Self {
        Self {
            heading_attributes: true,
            ..Self::default()
        }
    }

    /// Only CommonMark, no extensions.
    pub fn none() -> Self {
        Self {
            tables: false,
            footnotes: false,
            strikethrough: false,
            task_lists: false,
            heading_attributes: false,
        }
    }

    fn to_pulldown_options(&self) -> Options {
        let mut opts = Options::empty();
        if self.tables {
            opts.insert(Options::ENABLE_TABLES);
        }
        if self.footnotes {
            opts.insert(Options::ENABLE_FOOTNOTES);
        }
        if self.strikethrough {
            opts.insert(Options::ENABLE_STRIKETHROUGH);
        }
        if self.task_lists {
            opts.insert(Options::ENABLE_TASKLISTS);
        }
        if self.heading_attributes {
            opts.insert(Options::ENABLE_HEADING_ATTRIBUTES);
        }
        opts
    }
}

/// pulldown-cmark backed converter.
#[derive(Debug, Clone)]
pub struct CmarkConverter {
    options: Options,
}

impl CmarkConverter {
    pub fn new(options: &MarkdownOptions) -> Self {
        Self {
            options: options.to_pulldown_options(),
        }
    }
}

impl Default for CmarkConverter {
    fn default() -> Self {
        Self::new(&MarkdownOptions::default())
    }
}

impl Convert for CmarkConverter {
    fn convert(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, self.options);
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// `.md` → `.html` with front matter moved into metadata.
#[derive(Clone)]
pub struct MarkdownPipeline {
    converter: Arc<dyn Convert>,
}

impl MarkdownPipeline {
    pub fn new(converter: Arc<dyn Convert>) -> Self {
        Self { converter }
    }
}

impl Pipeline for MarkdownPipeline {
    fn name(&self) -> &str {
        "markdown"
    }

    fn process(&self, mut asset: Asset) -> Result<Asset> {
        if asset.extension() != Some("md") {
            return Ok(asset);
        }

        let source = asset.text()?;
        let (front_matter, body) = split_front_matter(source)
            .map_err(|message| BuildError::parse(&asset.source, message))?;

        let html = self.converter.convert(body);
        asset.metadata.extend(front_matter);
        asset.content = html.into_bytes();
        asset.path.set_extension("html");
        Ok(asset)
    }
}

/// Split YAML (`---`) or TOML (`+++`) front matter from the body.
///
/// An opening fence without a closing one is treated as plain content.
pub fn split_front_matter(content: &str) -> std::result::Result<(Metadata, &str), String> {
    let Some((fm, body, is_toml)) = detect_front_matter(content) else {
        return Ok((Metadata::new(), content));
    };
    if fm.is_empty() {
        return Ok((Metadata::new(), body));
    }

    let value: Value = if is_toml {
        toml::from_str(fm).map_err(|e| format!("invalid TOML front matter: {e}"))?
    } else {
        serde_yaml::from_str(fm).map_err(|e| format!("invalid YAML front matter: {e}"))?
    };

    match value {
        Value::Object(map) => Ok((map, body)),
        Value::Null => Ok((Metadata::new(), body)),
        other => Err(format!("front matter must be a mapping, found `{other}`")),
    }
}

/// Returns `(front_matter, body, is_toml)` if found.
fn detect_front_matter(content: &str) -> Option<(&str, &str, bool)> {
    for (fence, is_toml) in [("---", false), ("+++", true)] {
        if let Some(rest) = content.strip_prefix(fence)
            && let Some(end) = rest.find(&format!("\n{fence}"))
        {
            let fm = rest[..end].trim();
            let body = rest[end + 1 + fence.len()..].trim_start_matches(['\r', '\n']);
            return Some((fm, body, is_toml));
        }
    }
    None
}
