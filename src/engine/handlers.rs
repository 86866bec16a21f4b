//! Command handler: merge config layers, wire Ctrl-C, run, report.

use anyhow::Result;
use colored::Colorize;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::engine::Cli;
use crate::slice::slice_with_opts;
use crate::utils::env_override::workers_from_env;
use crate::utils::setup_logging;
use crate::utils::slicer_toml::{apply_file_to_opts, load_slicer_toml};
use crate::{Opts, RunSummary};

/// Defaults → `.pmslicer.toml` → `PMSLICER_WORKERS` (env, then `.env`) → CLI flags.
pub fn build_opts(cli: &Cli, config_dir: &Path) -> Result<Opts> {
    let mut opts = Opts {
        show_progress: true,
        ..Opts::default()
    };
    if let Some(file) = load_slicer_toml(config_dir) {
        apply_file_to_opts(&file, &mut opts);
    }
    if let Some(n) = workers_from_env(config_dir)? {
        opts.num_workers = Some(n);
    }

    opts.min_zoom = cli.min_zoom;
    opts.max_zoom = cli.max_zoom;
    if let Some(n) = cli.workers {
        opts.num_workers = Some(usize::try_from(n)?);
    }
    if let Some(ts) = cli.tile_size {
        opts.tile_size = ts;
    }
    if let Some(cap) = cli.queue_capacity {
        opts.queue_capacity = usize::try_from(cap)?;
    }
    if let Some(level) = cli.compression_level {
        opts.compression_level = level;
    }
    if let Some(v) = cli.verify {
        opts.verify = v;
    }
    if let Some(v) = cli.verbose {
        opts.verbose = v;
    }
    if let Some(q) = cli.quiet {
        opts.show_progress = !q;
    }
    Ok(opts)
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn log_summary(output: &Path, summary: &RunSummary, started: Instant) {
    info!(
        "{} {} in {:.1?}",
        "Wrote".green().bold(),
        output.display(),
        started.elapsed()
    );
    info!(
        "  {} enumerated, {} written ({} unique), {} empty, {} failed; {} on {} worker(s)",
        summary.enumerated,
        summary.written,
        summary.unique_payloads,
        summary.empty,
        summary.failed,
        format_bytes(summary.archive_bytes),
        summary.workers
    );
}

/// Handle a slicing run from the CLI.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = build_opts(cli, Path::new("."))?;
    setup_logging(opts.verbose);
    log::debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        if let Err(e) = ctrlc::set_handler(move || {
            if !cancel.swap(true, Ordering::SeqCst) {
                eprintln!("\nCancelling: finishing in-flight tiles...");
            }
        }) {
            warn!("Ctrl-C handler not installed: {e}");
        }
    }

    let started = Instant::now();
    let summary = slice_with_opts(&cli.input_file, &cli.output_file, &opts, &cancel)?;
    log_summary(&cli.output_file, &summary, started);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_flags_beat_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".pmslicer.toml"),
            "[settings]\ntile_size = 128\nqueue_capacity = 7\n",
        )
        .unwrap();
        let cli = Cli::try_parse_from([
            "pmslicer",
            "in.tif",
            "out.pmtiles",
            "--min_zoom",
            "1",
            "--max-zoom",
            "3",
            "--tile-size",
            "64",
            "-q",
        ])
        .unwrap();
        let opts = build_opts(&cli, dir.path()).unwrap();
        assert_eq!((opts.min_zoom, opts.max_zoom), (1, 3));
        assert_eq!(opts.tile_size, 64);
        assert_eq!(opts.queue_capacity, 7);
        assert!(!opts.show_progress);
    }

    #[test]
    fn zoom_flags_are_required() {
        assert!(Cli::try_parse_from(["pmslicer", "in.tif", "out.pmtiles"]).is_err());
        assert!(
            Cli::try_parse_from([
                "pmslicer", "in.tif", "out.pmtiles", "--min_zoom", "0", "--max_zoom", "2",
                "--workers", "0"
            ])
            .is_err()
        );
    }

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
    }
}
