//! Directory walking.

use jwalk::WalkDir;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};

const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Collect all files under `dir` recursively, in sorted order.
///
/// Symlinks to files count as files; symlinked directories are not
/// descended into. A missing directory yields nothing, any other walk
/// failure is an error naming the entry that could not be read.
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort(true) {
        let entry = entry.map_err(|e| walk_error(dir, &e))?;
        let path = entry.path();
        // Unreadable directories are reported on their own entry
        if let Some(e) = &entry.read_children_error {
            return Err(walk_error(&path, e));
        }

        let file_type = entry.file_type();
        let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
        let ignored = entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_FILES.contains(&name));
        if is_file && !ignored {
            files.push(path);
        }
    }
    Ok(files)
}

fn walk_error(fallback: &Path, e: &jwalk::Error) -> BuildError {
    let path = e.path().unwrap_or(fallback).to_path_buf();
    let kind = e.io_error().map_or(io::ErrorKind::Other, io::Error::kind);
    BuildError::io("walk", path, io::Error::new(kind, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_collect_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("b/z.md"), "").unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join(".DS_Store"), "").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a.md"), PathBuf::from("b/z.md")]);
    }

    #[test]
    fn test_collect_missing_dir() {
        assert!(collect_files(Path::new("/nonexistent/dir")).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_follows_file_symlinks() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("shared.md"), "").unwrap();
        std::os::unix::fs::symlink(outside.path().join("shared.md"), dir.path().join("a.md")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone.md"), dir.path().join("dangling.md"))
            .unwrap();

        let files = collect_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.md")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_error_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir_all(&locked).unwrap();
        fs::write(locked.join("a.md"), "").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through missing permissions
        let readable = fs::read_dir(&locked).is_ok();
        let result = collect_files(dir.path());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            let err = result.unwrap_err();
            assert!(matches!(err, BuildError::Io { op: "walk", .. }), "{err}");
        }
    }
}
