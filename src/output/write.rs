//! Atomic file writes.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BuildError, Result};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `data` to `dest` through a sibling temp file and a rename, so
/// readers (and crashed builds) never observe a half-written file.
///
/// Parent directories are created as needed.
pub fn atomic_write(dest: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io("create directory", parent, e))?;
    }

    let tmp = tmp_path(dest);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(data)?;
        file.flush()
    });

    if let Err(e) = written.and_then(|()| fs::rename(&tmp, dest)) {
        let _ = fs::remove_file(&tmp);
        return Err(BuildError::io("write", dest, e));
    }
    Ok(())
}

/// Hidden temp name unique per process and call.
fn tmp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    dest.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a/b/c.html");
        atomic_write(&dest, b"hi").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hi");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("index.html");
        atomic_write(&dest, b"one").unwrap();
        atomic_write(&dest, b"two").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"two");
    }

    #[test]
    fn test_tmp_paths_unique() {
        let dest = Path::new("/x/a.css");
        assert_ne!(tmp_path(dest), tmp_path(dest));
    }
}
