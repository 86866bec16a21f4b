//! Slicing operations: resolve paths, size the pool, run the pipeline, optionally verify.

use anyhow::{Context, Result};
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::archive::{PmtilesReader, PmtilesWriter};
use crate::disk_detect::determine_workers_for_input;
use crate::engine::tools::{check_output, resolve_input};
use crate::pipeline::{PipelineRequest, PipelineTuning, run_pipeline};
use crate::raster::GeoTiffOpener;
use crate::utils::config::WorkerThreadLimits;
use crate::{Opts, RunSummary};

/// Slice `input` into a PMTiles archive at `output` with full options.
///
/// `cancel` is polled between tiles; raise it (e.g. from a Ctrl-C handler) to stop early.
pub fn slice_with_opts(
    input: &Path,
    output: &Path,
    opts: &Opts,
    cancel: &Arc<AtomicBool>,
) -> Result<RunSummary> {
    let input = resolve_input(input)?;
    check_output(output, &input)?;

    let (num_workers, drive_type) =
        determine_workers_for_input(&input, &WorkerThreadLimits::current(), opts.num_workers);
    debug!("Source on {drive_type:?} drive; {num_workers} worker(s)");

    let request = PipelineRequest {
        min_zoom: opts.min_zoom,
        max_zoom: opts.max_zoom,
        tuning: PipelineTuning::from_opts(opts, num_workers),
        show_progress: opts.show_progress,
        verbose: opts.verbose,
    };
    let opener = GeoTiffOpener::new(&input);
    let summary = run_pipeline(&opener, || PmtilesWriter::create(output), &request, cancel)?;

    if opts.verify {
        let report = PmtilesReader::open(output)
            .and_then(|r| r.verify())
            .with_context(|| format!("verify {}", output.display()))?;
        info!(
            "Verified {}: {} tiles in {} entries, {} leaf directories",
            output.display(),
            report.addressed_tiles,
            report.tile_entries,
            report.leaf_directories
        );
    }
    Ok(summary)
}
