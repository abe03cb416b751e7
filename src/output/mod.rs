//! Output merger: writes rendered pages into the output tree.
//!
//! Overwrite is the default. Merge mode diffs the previous output against
//! the new render and patches it instead of replacing it wholesale.

mod diff;
mod write;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{BuildError, Result};

pub use diff::{Patch, PatchConflict, PatchOp, merge};
pub use write::atomic_write;

/// How rendered pages replace existing output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Overwrite,
    Merge,
}

/// What happened to an output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
}

impl WriteOutcome {
    #[inline]
    pub fn wrote(self) -> bool {
        self != Self::Unchanged
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMerger {
    mode: OutputMode,
}

impl OutputMerger {
    pub const fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    #[inline]
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Write `rendered` to `path`. Identical bytes are left untouched.
    pub fn write(&self, path: &Path, rendered: &[u8]) -> Result<WriteOutcome> {
        let existing = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                atomic_write(path, rendered)?;
                return Ok(WriteOutcome::Created);
            }
            Err(e) => return Err(BuildError::io("read", path, e)),
        };

        if existing == rendered {
            return Ok(WriteOutcome::Unchanged);
        }

        match self.mode {
            OutputMode::Overwrite => atomic_write(path, rendered)?,
            OutputMode::Merge => {
                let merged = match (std::str::from_utf8(&existing), std::str::from_utf8(rendered)) {
                    (Ok(old), Ok(new)) => merge(old, new).into_bytes(),
                    _ => rendered.to_vec(),
                };
                atomic_write(path, &merged)?;
            }
        }
        Ok(WriteOutcome::Updated)
    }

    /// Write bytes verbatim, skipping identical content.
    pub fn copy(&self, path: &Path, bytes: &[u8]) -> Result<WriteOutcome> {
        match fs::read(path) {
            Ok(existing) if existing == bytes => Ok(WriteOutcome::Unchanged),
            Ok(_) => atomic_write(path, bytes).map(|()| WriteOutcome::Updated),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                atomic_write(path, bytes).map(|()| WriteOutcome::Created)
            }
            Err(e) => Err(BuildError::io("read", path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_created_then_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.html");
        let merger = OutputMerger::default();

        assert_eq!(merger.write(&path, b"<p>1</p>").unwrap(), WriteOutcome::Created);
        assert_eq!(merger.write(&path, b"<p>1</p>").unwrap(), WriteOutcome::Unchanged);
        assert_eq!(merger.write(&path, b"<p>2</p>").unwrap(), WriteOutcome::Updated);
        assert_eq!(fs::read(&path).unwrap(), b"<p>2</p>");
    }

    #[test]
    fn test_merge_mode_reaches_rendered_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.html");
        fs::write(&path, "<html>\n<h1>Old</h1>\n</html>\n").unwrap();

        let merger = OutputMerger::new(OutputMode::Merge);
        let rendered = "<html>\n<h1>New</h1>\n</html>\n";
        assert_eq!(merger.write(&path, rendered.as_bytes()).unwrap(), WriteOutcome::Updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), rendered);
    }

    #[test]
    fn test_merge_mode_binary_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        fs::write(&path, [0xff, 0xfe]).unwrap();

        let merger = OutputMerger::new(OutputMode::Merge);
        merger.write(&path, b"text").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"text");
    }

    #[test]
    fn test_copy_skips_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("style.css");
        let merger = OutputMerger::default();
        assert!(merger.copy(&path, b"body{}").unwrap().wrote());
        assert!(!merger.copy(&path, b"body{}").unwrap().wrote());
    }
}
