//! Passthrough pipelines.

use super::{Asset, Pipeline};
use crate::error::Result;

/// HTML files keep their bytes; layouts are applied after processing.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlPipeline;

impl Pipeline for HtmlPipeline {
    fn name(&self) -> &str {
        "html"
    }

    fn process(&self, asset: Asset) -> Result<Asset> {
        Ok(asset)
    }
}

/// Fallback for every unclaimed extension: bytes are copied verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyPipeline;

impl Pipeline for CopyPipeline {
    fn name(&self) -> &str {
        "copy"
    }

    fn process(&self, asset: Asset) -> Result<Asset> {
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_keeps_bytes() {
        let asset = Asset::new("content/a.css", b"body{}".to_vec());
        assert_eq!(CopyPipeline.process(asset.clone()).unwrap(), asset);
        assert_eq!(HtmlPipeline.process(asset.clone()).unwrap(), asset);
    }
}
