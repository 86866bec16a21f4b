//! Worker-count override from the environment: process env first, then `.env` in the working
//! directory.

use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::utils::config::PackagePaths;

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn try_env_then_dotenv(key: &str, dir: &Path) -> Option<String> {
    if let Some(v) = std::env::var(key).ok().and_then(non_empty) {
        return Some(v);
    }
    let env_path = dir.join(".env");
    if !env_path.is_file() {
        return None;
    }
    // Read without mutating the process environment.
    dotenvy::from_path_iter(&env_path)
        .ok()?
        .filter_map(|item| item.ok())
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| non_empty(v))
}

/// Parse a worker count; must be a positive integer.
pub fn parse_workers(raw: &str) -> Result<usize> {
    let n: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("worker count {raw:?} is not a positive integer"))?;
    if n == 0 {
        bail!("worker count must be at least 1");
    }
    Ok(n)
}

/// `PMSLICER_WORKERS` from the environment or `dir/.env`. `Ok(None)` when unset; an
/// unparsable value is a setup error.
pub fn workers_from_env(dir: &Path) -> Result<Option<usize>> {
    let key = PackagePaths::get().workers_env_key();
    match try_env_then_dotenv(key, dir) {
        Some(raw) => parse_workers(&raw)
            .with_context(|| format!("invalid {key}"))
            .map(Some),
        None => Ok(None),
    }
}
