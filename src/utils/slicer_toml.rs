//! Load `.pmslicer.toml` from the working directory (CLI only). The library takes its options
//! through `SliceOpts`.

use serde::Deserialize;
use std::path::Path;

use crate::Opts;
use crate::utils::config::PackagePaths;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SlicerToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    workers: Option<usize>,
    tile_size: Option<u32>,
    queue_capacity: Option<usize>,
    compression_level: Option<u32>,
    verify: Option<bool>,
    verbose: Option<bool>,
    quiet: Option<bool>,
}

/// Load the config file from `dir` if present. A malformed file is warned about and ignored.
pub(crate) fn load_slicer_toml(dir: &Path) -> Option<SlicerToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_slicer_toml(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

pub(crate) fn parse_slicer_toml(s: &str) -> Result<SlicerToml, toml::de::Error> {
    toml::from_str(s)
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident => $opts_field:ident) => {
        if let Some(v) = $section.$field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before env and CLI.
pub(crate) fn apply_file_to_opts(file: &SlicerToml, opts: &mut Opts) {
    let s = &file.settings;
    if let Some(n) = s.workers.filter(|&n| n > 0) {
        opts.num_workers = Some(n);
    }
    apply_file_opt!(s, opts, tile_size => tile_size);
    apply_file_opt!(s, opts, queue_capacity => queue_capacity);
    apply_file_opt!(s, opts, compression_level => compression_level);
    apply_file_opt!(s, opts, verify => verify);
    apply_file_opt!(s, opts, verbose => verbose);
    if let Some(quiet) = s.quiet {
        opts.show_progress = !quiet;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_override_defaults() {
        let file = parse_slicer_toml(
            "[settings]\nworkers = 3\ntile_size = 512\nquiet = true\ncompression_level = 6\n",
        )
        .unwrap();
        let mut opts = Opts {
            show_progress: true,
            ..Opts::default()
        };
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.num_workers, Some(3));
        assert_eq!(opts.tile_size, 512);
        assert_eq!(opts.compression_level, 6);
        assert!(!opts.show_progress);
        assert_eq!(opts.queue_capacity, Opts::default().queue_capacity);
    }

    #[test]
    fn empty_file_changes_nothing() {
        let file = parse_slicer_toml("").unwrap();
        let mut opts = Opts::default();
        apply_file_to_opts(&file, &mut opts);
        assert_eq!(opts.num_workers, None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_slicer_toml("[settings]\ndb_path = \"x\"\n").is_err());
    }
}
