//! Pipeline adapter that forwards assets to a plugin process.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use super::{Asset, Pipeline};
use crate::error::Result;
use crate::plugin::protocol::WireAsset;
use crate::plugin::{PluginClient, PluginError};
use crate::utils::path::cache_key;

pub struct PluginPipeline {
    name: String,
    client: Arc<PluginClient>,
    root: PathBuf,
    content_dir: PathBuf,
}

impl PluginPipeline {
    pub fn new(name: String, client: Arc<PluginClient>, root: PathBuf, content_dir: PathBuf) -> Self {
        Self {
            name,
            client,
            root,
            content_dir,
        }
    }

    /// Resolve a path returned by the plugin; it must stay in the content tree.
    fn resolve(&self, returned: &str) -> Result<PathBuf, PluginError> {
        let rel = Path::new(returned);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        let path = self.root.join(rel);

        if escapes || !path.starts_with(&self.content_dir) {
            return Err(PluginError::Protocol {
                plugin: self.client.name().to_owned(),
                message: format!(
                    "pipeline `{}` returned path `{returned}` outside the content directory",
                    self.name
                ),
            });
        }
        Ok(path)
    }
}

impl Pipeline for PluginPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, asset: Asset) -> Result<Asset> {
        let Asset {
            source,
            path,
            content,
            metadata,
        } = asset;

        let wire = WireAsset {
            pipeline: self.name.clone(),
            path: cache_key(&self.root, &path),
            content,
            metadata,
        };
        let returned = self.client.process_asset(wire)?;

        Ok(Asset {
            source,
            path: self.resolve(&returned.path)?,
            content: returned.content,
            metadata: returned.metadata,
        })
    }
}
