//! Out-of-process plugins.
//!
//! Every executable under the plugins directory is started for the length
//! of one build and driven over a framed JSON protocol on its stdio (see
//! [`protocol`]). Plugins hook into the build lifecycle:
//!
//! ```text
//! OnPreBuild → OnConfigLoaded → OnPublicAssetsCopied
//!     → per file: OnContentLoaded → OnContentRender → OnHTMLRendered
//! → OnPostBuild
//! ```
//!
//! and may contribute pipelines for extra file extensions.

mod client;
pub mod protocol;
pub mod server;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::Result;
use crate::pipeline::{PipelineRegistry, PluginPipeline};
use crate::scheduler::CancelToken;
use crate::utils::walk::collect_files;
use crate::{debug, log};

pub use client::PluginClient;
pub use protocol::{Capability, PipelineDecl};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to start plugin `{path}`")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("plugin `{plugin}` failed the handshake: {reason}")]
    Handshake { plugin: String, reason: String },

    #[error("lost connection to plugin `{plugin}`")]
    Io {
        plugin: String,
        #[source]
        source: io::Error,
    },

    #[error("plugin `{plugin}` violated the protocol: {message}")]
    Protocol { plugin: String, message: String },

    #[error("plugin `{plugin}` failed in {hook}: {message}")]
    Remote {
        plugin: String,
        hook: String,
        message: String,
    },

    #[error("plugin `{plugin}` is already shut down")]
    Closed { plugin: String },

    #[error("plugin `{plugin}` did not answer within {}ms", .timeout.as_millis())]
    Timeout { plugin: String, timeout: Duration },

    #[error("call to plugin `{plugin}` was canceled")]
    Canceled { plugin: String },
}

/// How plugins are found and greeted. Passed in explicitly; nothing about
/// plugins lives in process-wide state.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    pub dir: PathBuf,
    pub protocol_version: u32,
    pub cookie_key: String,
    pub cookie_value: String,
    pub handshake_timeout: Duration,
    /// Longest wait for the answer to a single request.
    pub call_timeout: Duration,
    /// Working directory for plugin processes.
    pub working_dir: Option<PathBuf>,
    /// Interrupts calls that are waiting on an answer.
    pub cancel: CancelToken,
}

impl PluginConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            protocol_version: protocol::PROTOCOL_VERSION,
            cookie_key: protocol::COOKIE_KEY.to_owned(),
            cookie_value: protocol::COOKIE_VALUE.to_owned(),
            handshake_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(60),
            working_dir: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Abort in-flight calls once `cancel` fires.
    pub fn cancel_on(mut self, cancel: &CancelToken) -> Self {
        self.cancel = cancel.clone();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// The plugins of one build. Dropping the host shuts every plugin down.
#[derive(Debug, Default)]
pub struct PluginHost {
    plugins: Vec<Arc<PluginClient>>,
}

impl PluginHost {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_clients(plugins: Vec<PluginClient>) -> Self {
        Self {
            plugins: plugins.into_iter().map(Arc::new).collect(),
        }
    }

    /// Start every executable under `config.dir`.
    ///
    /// Plugins that fail to start or to complete the handshake are logged
    /// and skipped. A missing directory means no plugins.
    pub fn discover(config: &PluginConfig) -> Self {
        let paths = collect_files(&config.dir).unwrap_or_else(|e| {
            log!("warning"; "cannot scan plugins: {e}");
            Vec::new()
        });
        let mut plugins = Vec::new();
        for path in paths {
            if !is_executable(&path) {
                debug!("plugin"; "skipping non-executable {}", path.display());
                continue;
            }
            match PluginClient::spawn(&path, config) {
                Ok(client) => {
                    log!("plugin"; "loaded `{}`", client.name());
                    plugins.push(Arc::new(client));
                }
                Err(e) => log!("warning"; "skipping plugin: {e}"),
            }
        }
        Self { plugins }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    fn with(&self, capability: Capability) -> impl Iterator<Item = &Arc<PluginClient>> {
        self.plugins.iter().filter(move |p| p.supports(capability))
    }

    fn notify_all(&self, capability: Capability, request: &protocol::Request) -> Result<()> {
        for plugin in self.with(capability) {
            debug!("plugin"; "{} → `{}`", capability.hook_name(), plugin.name());
            plugin.notify(capability, request)?;
        }
        Ok(())
    }

    pub fn pre_build(&self) -> Result<()> {
        self.notify_all(Capability::PreBuild, &protocol::Request::PreBuild)
    }

    /// Thread the serialized site config through every plugin in order.
    pub fn config_loaded(&self, mut config: Vec<u8>) -> Result<Vec<u8>> {
        for plugin in self.with(Capability::ConfigLoaded) {
            config = plugin.config_loaded(config)?;
        }
        Ok(config)
    }

    pub fn public_assets_copied(&self) -> Result<()> {
        self.notify_all(
            Capability::PublicAssetsCopied,
            &protocol::Request::PublicAssetsCopied,
        )
    }

    /// Run one per-file hook across all plugins that implement it.
    pub fn content_hook(&self, hook: Capability, path: &str, mut content: Vec<u8>) -> Result<Vec<u8>> {
        for plugin in self.with(hook) {
            content = plugin.content_hook(hook, path, content)?;
        }
        Ok(content)
    }

    pub fn post_build(&self) -> Result<()> {
        self.notify_all(Capability::PostBuild, &protocol::Request::PostBuild)
    }

    /// Ask plugins for pipelines and register an adapter for each.
    ///
    /// Returns the number of pipelines registered.
    pub fn register_pipelines(
        &self,
        registry: &mut PipelineRegistry,
        root: &Path,
        content_dir: &Path,
    ) -> Result<usize> {
        let mut count = 0;
        for plugin in self.with(Capability::Pipelines) {
            for decl in plugin.register_pipelines()? {
                let adapter = PluginPipeline::new(
                    decl.name.clone(),
                    Arc::clone(plugin),
                    root.to_path_buf(),
                    content_dir.to_path_buf(),
                );
                if registry.register(Arc::new(adapter), &decl.extensions) > 0 {
                    debug!("plugin"; "`{}` registered pipeline `{}` for {:?}", plugin.name(), decl.name, decl.extensions);
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Shut every plugin down now rather than on drop.
    pub fn shutdown(&self) {
        for plugin in &self.plugins {
            plugin.shutdown();
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exe"))
}
