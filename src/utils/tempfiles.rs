//! Spool file housekeeping next to the output archive.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::utils::config::PackagePaths;

/// Spool path for `output`, with any stale spool from an interrupted run removed.
pub fn prepare_spool_path(output: &Path) -> Result<PathBuf> {
    let spool = PackagePaths::get().spool_path_for(output);
    match std::fs::remove_file(&spool) {
        Ok(()) => log::debug!("Removed stale spool {}", spool.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e)
                .with_context(|| format!("remove stale spool file {}", spool.display()));
        }
    }
    Ok(spool)
}

/// Best-effort removal of a partial output and its spool (cancelled or failed runs).
pub fn remove_partial_output(output: &Path) {
    let spool = PackagePaths::get().spool_path_for(output);
    let _ = std::fs::remove_file(&spool);
    let _ = std::fs::remove_file(output);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_spool_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pmtiles");
        let stale = dir.path().join("out.pmtiles.spool");
        std::fs::write(&stale, b"old").unwrap();
        assert_eq!(prepare_spool_path(&output).unwrap(), stale);
        assert!(!stale.exists());
    }

    #[test]
    fn partial_output_and_spool_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.pmtiles");
        let spool = dir.path().join("out.pmtiles.spool");
        std::fs::write(&output, b"partial").unwrap();
        std::fs::write(&spool, b"tiles").unwrap();
        remove_partial_output(&output);
        assert!(!output.exists());
        assert!(!spool.exists());
        // Nothing left to remove is fine.
        remove_partial_output(&output);
    }
}
