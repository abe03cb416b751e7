//! Site configuration management for `evoke.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `[site]`       | Free-form values, exposed to templates as `.Site`    |
//! | `[build]`      | Directories, workers, fan-out, output mode           |
//! | `[markdown]`   | pulldown-cmark extensions                            |
//! | `[plugins]`    | Plugin handshake settings                            |
//!
//! The project root is the directory holding the config file. Every
//! directory in `[build]` is resolved against it.

mod error;
mod section;

pub use error::ConfigError;
pub use section::{BuildSectionConfig, PluginSectionConfig};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::log;
use crate::pipeline::MarkdownOptions;
use crate::plugin::PluginConfig;
use crate::utils::path::{normalize_path, resolve_path};

/// Default config file name.
pub const CONFIG_FILE: &str = "evoke.toml";

/// Root configuration structure representing evoke.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Absolute path to the config file (empty when running on defaults)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file
    #[serde(skip)]
    pub root: PathBuf,

    /// Site values for templates
    pub site: Map<String, Value>,

    /// Build settings
    pub build: BuildSectionConfig,

    /// Markdown extensions
    pub markdown: MarkdownOptions,

    /// Plugin settings
    pub plugins: PluginSectionConfig,
}

/// Resolved project directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePaths {
    pub root: PathBuf,
    pub content: PathBuf,
    pub partials: PathBuf,
    pub public: PathBuf,
    pub plugins: PathBuf,
    pub output: PathBuf,
}

impl SiteConfig {
    /// Find `name` upward from the current directory and load it.
    ///
    /// Without a config file the defaults apply, rooted at the current
    /// directory.
    pub fn load(name: &Path) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|e| ConfigError::Io(PathBuf::from("."), e))?;

        match find_config_file(name, &cwd) {
            Some(path) => Self::from_path(&path),
            None => {
                log!("config"; "no {} found, using defaults", name.display());
                Ok(Self::default().with_root(&cwd))
            }
        }
    }

    /// Load configuration from file path with unknown field detection.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        let path = normalize_path(path);
        let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut config = config.with_root(&root);
        config.config_path = path;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {display_path} are ignored: {}", fields.join(", "));
    }

    /// Set the project root.
    pub fn with_root(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self
    }

    /// Check values that parse fine but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.workers == Some(0) {
            return Err(ConfigError::Validation(
                "build.workers must be at least 1".into(),
            ));
        }
        if self.plugins.handshake_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "plugins.handshake_timeout_ms must be positive".into(),
            ));
        }
        if self.plugins.call_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "plugins.call_timeout_ms must be positive".into(),
            ));
        }

        let paths = self.paths();
        if paths.output == paths.content || paths.content.starts_with(&paths.output) {
            return Err(ConfigError::Validation(format!(
                "build.output `{}` must not contain the content directory",
                self.build.output.display()
            )));
        }
        if paths.output.starts_with(&paths.content) {
            return Err(ConfigError::Validation(format!(
                "build.output `{}` must not be inside the content directory",
                self.build.output.display()
            )));
        }
        Ok(())
    }

    /// Directories resolved against the project root.
    pub fn paths(&self) -> SitePaths {
        let resolve = |path: &Path| resolve_path(path, &self.root);
        SitePaths {
            root: self.root.clone(),
            content: resolve(&self.build.content),
            partials: resolve(&self.build.partials),
            public: resolve(&self.build.public),
            plugins: resolve(&self.build.plugins),
            output: resolve(&self.build.output),
        }
    }

    /// Plugin discovery settings; plugins run from the project root.
    pub fn plugin_config(&self) -> PluginConfig {
        PluginConfig::new(self.paths().plugins)
            .handshake_timeout(self.plugins.handshake_timeout())
            .call_timeout(self.plugins.call_timeout())
            .working_dir(&self.root)
    }

    /// `[site]` as JSON, the payload of the config-loaded plugin hook.
    pub fn site_json(&self) -> Vec<u8> {
        serde_json::to_vec(&self.site).unwrap_or_else(|_| b"{}".to_vec())
    }
}

/// Find config file by searching upward from `start`.
///
/// ```text
/// /home/user/site/content/posts/  ← start
/// /home/user/site/evoke.toml      ← found!
/// ```
pub fn find_config_file(config_name: &Path, start: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.is_file().then(|| config_name.to_path_buf());
    }

    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(config_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}

// ============================================================================
// tests
// ============================================================================
