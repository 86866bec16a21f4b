//! Path checks run before any tile work starts.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Canonical path of an existing, regular source file.
pub fn resolve_input(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("source raster {} not found", path.display()))?;
    if !canonical.is_file() {
        bail!("source raster {} is not a file", canonical.display());
    }
    Ok(canonical)
}

/// Output must be a file path in an existing directory and must not be the input.
pub fn check_output(output: &Path, input: &Path) -> Result<()> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        bail!("output directory {} does not exist", parent.display());
    }
    if output.is_dir() {
        bail!("output {} is a directory", output.display());
    }
    if let Ok(existing) = output.canonicalize()
        && existing == input
    {
        bail!("output {} would overwrite the source raster", output.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_rejected() {
        assert!(resolve_input(Path::new("/no/such/raster.tif")).is_err());
    }

    #[test]
    fn output_checks() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.tif");
        std::fs::write(&input, b"x").unwrap();
        let input = resolve_input(&input).unwrap();

        assert!(check_output(&dir.path().join("out.pmtiles"), &input).is_ok());
        assert!(check_output(dir.path(), &input).is_err());
        assert!(check_output(&input, &input).is_err());
        assert!(check_output(&dir.path().join("missing/out.pmtiles"), &input).is_err());
    }
}
