//! pmslicer: slice a large georeferenced raster into a single-file PMTiles pyramid.
//!
//! Many tile workers (each with its own decoder) feed one archive writer through a bounded
//! relay, so memory stays flat no matter how fast extraction runs.

pub mod archive;
pub mod disk_detect;
pub mod engine;
pub mod pipeline;
pub mod raster;
pub mod slice;
pub mod tiles;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

use log::debug;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Result alias used by the public pmslicer API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Single entry point: slice `input` (GeoTIFF/COG) into a PMTiles archive at `output`.
///
/// Worker count comes from `opts.num_workers` or, when None, from the drive type of `input`;
/// both are capped by the open-file limit. No progress bar, no config files, no env lookup:
/// the caller owns configuration.
pub fn slice_to_archive(input: &Path, output: &Path, opts: &SliceOpts) -> Result<RunSummary> {
    let opts = Opts::from(opts);
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts
    );
    slice::slice_with_opts(input, output, &opts, &Arc::new(AtomicBool::new(false)))
}

/// Returns `(num_workers, drive_type)` the library would pick for `input`.
///
/// ```ignore
/// let (n, _) = pmslicer::tuning_for_input(path, None);
/// let opts = SliceOpts { num_workers: Some(n), max_zoom: 8, ..Default::default() };
/// ```
pub fn tuning_for_input(
    input: &Path,
    available_threads: Option<usize>,
) -> (usize, disk_detect::DriveType) {
    let mut limits = utils::config::WorkerThreadLimits::current();
    if let Some(n) = available_threads {
        limits.all_threads = n;
    }
    disk_detect::determine_workers_for_input(input, &limits, None)
}
