//! Path normalization utilities.
//!
//! - `normalize_path` - file system paths (canonicalize + fallback)
//! - `resolve_path` - resolve relative paths against a base directory
//! - `cache_key` - stable project-relative key with `/` separators

use std::path::{Component, Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Resolve `path` against `base` unless it is already absolute.
#[inline]
pub fn resolve_path(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Project-relative key for a path, always `/`-separated.
///
/// Paths outside `root` keep their full form so they never collide with
/// project files.
pub fn cache_key(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            Component::RootDir => Some("".into()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether the file name starts with `_` (layouts, drafts, fragments).
#[inline]
pub fn is_underscored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_relative() {
        let root = Path::new("/site");
        assert_eq!(
            cache_key(root, Path::new("/site/content/posts/a.md")),
            "content/posts/a.md"
        );
        assert_eq!(
            cache_key(root, Path::new("/site/partials/header.html")),
            "partials/header.html"
        );
    }

    #[test]
    fn test_cache_key_outside_root() {
        let key = cache_key(Path::new("/site"), Path::new("/elsewhere/a.md"));
        assert_eq!(key, "/elsewhere/a.md");
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/site");
        assert_eq!(resolve_path(Path::new("content"), base), PathBuf::from("/site/content"));
        assert_eq!(resolve_path(Path::new("/abs"), base), PathBuf::from("/abs"));
    }

    #[test]
    fn test_is_underscored() {
        assert!(is_underscored(Path::new("content/_layout.html")));
        assert!(!is_underscored(Path::new("content/_drafts/a.md")));
        assert!(!is_underscored(Path::new("content/a.md")));
    }
}
