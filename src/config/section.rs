//! `[build]` and `[plugins]` sections.
//!
//! ```toml
//! [build]
//! content = "content"          # Source tree (relative to site root)
//! partials = "partials"        # Templates included via {{ partial "…" }}
//! public = "public"            # Mirrored into the output as-is
//! plugins = "plugins"          # Executables started as plugins
//! output = "dist"              # Output directory
//! workers = 8                  # Default: logical CPU count
//! fanout = "transitive"        # Partial change propagation: direct | transitive
//! output_mode = "overwrite"    # overwrite | merge
//!
//! [plugins]
//! handshake_timeout_ms = 5000
//! call_timeout_ms = 60000      # Per request, once connected
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::freshness::Fanout;
use crate::output::OutputMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSectionConfig {
    /// Content source directory.
    pub content: PathBuf,

    /// Partial templates directory.
    pub partials: PathBuf,

    /// Static files copied before content is processed.
    pub public: PathBuf,

    /// Plugin executables directory.
    pub plugins: PathBuf,

    /// Build output directory.
    pub output: PathBuf,

    /// Worker threads; `None` means one per logical CPU.
    pub workers: Option<usize>,

    pub fanout: Fanout,

    pub output_mode: OutputMode,
}

impl Default for BuildSectionConfig {
    fn default() -> Self {
        Self {
            content: "content".into(),
            partials: "partials".into(),
            public: "public".into(),
            plugins: "plugins".into(),
            output: "dist".into(),
            workers: None,
            fanout: Fanout::default(),
            output_mode: OutputMode::default(),
        }
    }
}

impl BuildSectionConfig {
    /// Configured worker count, or the number of logical CPUs.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSectionConfig {
    /// How long a plugin may take to send its handshake.
    pub handshake_timeout_ms: u64,
    /// How long a connected plugin may take to answer one request.
    pub call_timeout_ms: u64,
}

impl Default for PluginSectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5000,
            call_timeout_ms: 60_000,
        }
    }
}

impl PluginSectionConfig {
    #[inline]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    #[inline]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
