//! Build error taxonomy.
//!
//! Every stage of a build reports through [`BuildError`]. The scheduler keeps
//! only the first one; the CLI prints it with its source chain.

use std::{io, path::PathBuf};
use thiserror::Error;

use crate::plugin::PluginError;
use crate::template::TemplateError;

/// Errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Missing or unreadable file, or a failed write.
    #[error("failed to {op} `{path}`")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed front matter, template or layout.
    #[error("failed to parse `{path}`: {message}")]
    Parse { path: PathBuf, message: String },

    /// Plugin spawn, RPC or remote failure.
    #[error(transparent)]
    Plugin(PluginError),

    /// The persisted cache could not be decoded.
    #[error("corrupt build cache `{path}` (rerun with --clean to reset it)")]
    Cache {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid build options.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The build was canceled before it finished.
    #[error("build canceled")]
    Canceled,
}

/// A plugin call cut short by cancellation is the build being canceled.
impl From<PluginError> for BuildError {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Canceled { .. } => Self::Canceled,
            other => Self::Plugin(other),
        }
    }
}

impl BuildError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attach a file path to a template failure.
    pub fn template(path: impl Into<PathBuf>, err: TemplateError) -> Self {
        Self::parse(path, err.to_string())
    }

    /// Short label for the error class, used in log prefixes.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Parse { .. } => "parse",
            Self::Plugin(_) => "plugin",
            Self::Cache { .. } => "cache",
            Self::Config(_) => "config",
            Self::Canceled => "canceled",
        }
    }
}

pub type Result<T, E = BuildError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = BuildError::io(
            "read",
            "content/a.md",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.to_string(), "failed to read `content/a.md`");
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_cache_error_recommends_clean() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = BuildError::Cache {
            path: "dist/.cache".into(),
            source,
        };
        assert!(err.to_string().contains("--clean"));
    }

    #[test]
    fn test_canceled_plugin_call_cancels_build() {
        let err = BuildError::from(PluginError::Canceled {
            plugin: "p".into(),
        });
        assert!(matches!(err, BuildError::Canceled));

        let err = BuildError::from(PluginError::Closed { plugin: "p".into() });
        assert!(matches!(err, BuildError::Plugin(_)));
    }
}
