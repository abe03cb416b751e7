//! Wire protocol between the build host and plugin processes.
//!
//! Frames travel over the plugin's stdin/stdout: a little-endian `u32`
//! length followed by that many bytes of JSON. The plugin speaks first with
//! a [`Handshake`]; after that the host sends one [`Request`] at a time and
//! waits for its [`Response`].
//!
//! ```text
//! host                         plugin
//!  |  <---- Handshake ----------  |
//!  |  ----- Request ----------->  |
//!  |  <---- Response -----------  |
//!  |  ----- Shutdown ---------->  |
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

use crate::pipeline::Metadata;

/// Protocol revision spoken by this build.
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable holding the magic cookie.
pub const COOKIE_KEY: &str = "EVOKE_PLUGIN";

/// Expected cookie value, echoed back as the handshake token.
pub const COOKIE_VALUE: &str = "1.0";

/// Environment variable holding the host's protocol version.
pub const PROTOCOL_ENV: &str = "EVOKE_PLUGIN_PROTOCOL";

/// Frames larger than this are rejected.
pub const MAX_FRAME_LEN: usize = 64 << 20;

/// Lifecycle hooks and optional services a plugin can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PreBuild,
    ConfigLoaded,
    PublicAssetsCopied,
    ContentLoaded,
    ContentRender,
    HtmlRendered,
    PostBuild,
    Pipelines,
}

impl Capability {
    /// Hook name as shown in logs and errors.
    pub const fn hook_name(self) -> &'static str {
        match self {
            Self::PreBuild => "OnPreBuild",
            Self::ConfigLoaded => "OnConfigLoaded",
            Self::PublicAssetsCopied => "OnPublicAssetsCopied",
            Self::ContentLoaded => "OnContentLoaded",
            Self::ContentRender => "OnContentRender",
            Self::HtmlRendered => "OnHTMLRendered",
            Self::PostBuild => "OnPostBuild",
            Self::Pipelines => "RegisterPipelines",
        }
    }
}

/// First frame a plugin sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub protocol_version: u32,
    /// Must equal the cookie value the host put in the environment.
    pub token: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// A content file passed to a per-asset hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPayload {
    /// Project-relative, `/`-separated.
    pub path: String,
    #[serde(with = "hex_bytes")]
    pub content: Vec<u8>,
}

/// An asset handed to a plugin pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAsset {
    pub pipeline: String,
    /// Project-relative, `/`-separated.
    pub path: String,
    #[serde(with = "hex_bytes")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A pipeline a plugin offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDecl {
    pub name: String,
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    PreBuild,
    ConfigLoaded {
        #[serde(with = "hex_bytes")]
        config: Vec<u8>,
    },
    PublicAssetsCopied,
    ContentLoaded(ContentPayload),
    ContentRender(ContentPayload),
    HtmlRendered(ContentPayload),
    PostBuild,
    RegisterPipelines,
    ProcessAsset(WireAsset),
    Shutdown,
}

impl Request {
    /// Per-asset hook request for `hook`.
    ///
    /// Returns `None` for hooks that do not carry content.
    pub fn content(hook: Capability, payload: ContentPayload) -> Option<Self> {
        match hook {
            Capability::ContentLoaded => Some(Self::ContentLoaded(payload)),
            Capability::ContentRender => Some(Self::ContentRender(payload)),
            Capability::HtmlRendered => Some(Self::HtmlRendered(payload)),
            _ => None,
        }
    }

    /// Take the content bytes back out of a request.
    pub fn into_content(self) -> Vec<u8> {
        match self {
            Self::ConfigLoaded { config } => config,
            Self::ContentLoaded(p) | Self::ContentRender(p) | Self::HtmlRendered(p) => p.content,
            Self::ProcessAsset(asset) => asset.content,
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Pipelines(Vec<PipelineDecl>),
    Asset(WireAsset),
    /// The plugin does not implement this request.
    Unimplemented,
    Error(String),
}

/// Write one length-prefixed JSON frame. Does not flush.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let json = serde_json::to_vec(message).map_err(io::Error::other)?;
    if json.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds the {MAX_FRAME_LEN} byte limit", json.len()),
        ));
    }
    let len = u32::try_from(json.len()).map_err(io::Error::other)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)
}

/// Read one length-prefixed JSON frame.
///
/// A closed stream surfaces as `UnexpectedEof`.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    serde_json::from_slice(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Byte buffers travel as lowercase hex strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
