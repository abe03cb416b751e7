//! Mirror `public/` into the output directory.

use rayon::prelude::*;
use std::fs;
use std::path::Path;

use crate::error::{BuildError, Result};
use crate::output::OutputMerger;
use crate::utils::walk::collect_files;

/// Copy every file under `public` to the same relative path in `output`.
///
/// Files whose bytes already match are not rewritten. Returns the number of
/// files written.
pub(super) fn copy_public(public: &Path, output: &Path) -> Result<usize> {
    let merger = OutputMerger::default();
    let written = collect_files(public)?
        .par_iter()
        .map(|source| {
            let Ok(rel) = source.strip_prefix(public) else {
                return Ok(false);
            };
            let bytes = fs::read(source).map_err(|e| BuildError::io("read", source, e))?;
            merger
                .copy(&output.join(rel), &bytes)
                .map(|outcome| outcome.wrote())
        })
        .collect::<Result<Vec<bool>>>()?;

    Ok(written.into_iter().filter(|&w| w).count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_public() {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public");
        let output = dir.path().join("dist");
        fs::create_dir_all(public.join("img")).unwrap();
        fs::write(public.join("robots.txt"), "User-agent: *").unwrap();
        fs::write(public.join("img/a.png"), [0x89, b'P', b'N', b'G']).unwrap();

        assert_eq!(copy_public(&public, &output).unwrap(), 2);
        assert_eq!(fs::read(output.join("img/a.png")).unwrap(), [0x89, b'P', b'N', b'G']);

        // Identical files are skipped the second time
        assert_eq!(copy_public(&public, &output).unwrap(), 0);

        fs::write(public.join("robots.txt"), "User-agent: bot").unwrap();
        assert_eq!(copy_public(&public, &output).unwrap(), 1);
    }

    #[test]
    fn test_missing_public_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(copy_public(&dir.path().join("public"), dir.path()).unwrap(), 0);
    }
}
