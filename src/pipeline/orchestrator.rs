//! Pipeline coordinator: Init → Extracting → Draining → Finalized, with Cancelled and Failed
//! as the other terminal states.

use anyhow::{Context, Result, anyhow, bail};
use kdam::Animation;
use log::{debug, error};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::archive::{ArchiveHeader, ArchiveSink, Compression, TileType};
use crate::engine::encode::TileEncoder;
use crate::engine::progress::{ProgressBarConfig, create_progress_bar, refresh_bar};
use crate::pipeline::context::{
    PipelineHandles, PipelineTuning, WorkerContext, create_pipeline_channels,
};
use crate::pipeline::error_handler::report_failed_tiles;
use crate::pipeline::worker::{WorkerStats, spawn_tile_workers};
use crate::pipeline::writer::spawn_archive_writer;
use crate::raster::{RasterOpener, SourceInfo};
use crate::tiles::{TileEnumerator, validate_zoom_range};
use crate::{PipelineState, RunSummary};

/// What to generate. Source and destination come in as the opener and sink factory.
#[derive(Clone, Debug)]
pub struct PipelineRequest {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tuning: PipelineTuning,
    pub show_progress: bool,
    pub verbose: bool,
}

/// Current state plus debug logging of every transition.
struct StateTracker {
    state: PipelineState,
}

impl StateTracker {
    fn new() -> Self {
        debug!("pipeline: {:?}", PipelineState::Init);
        Self {
            state: PipelineState::Init,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!("pipeline: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Record `Failed` and hand the error back for propagation.
    fn fail(&mut self, err: anyhow::Error) -> anyhow::Error {
        self.advance(PipelineState::Failed);
        err
    }
}

/// Header and metadata written at finalize.
pub fn archive_header(info: &SourceInfo, request: &PipelineRequest) -> ArchiveHeader {
    let nodata = if info.nodata.is_nan() {
        json!("nan")
    } else {
        json!(info.nodata)
    };
    ArchiveHeader {
        bounds: info.bounds,
        min_zoom: request.min_zoom,
        max_zoom: request.max_zoom,
        tile_compression: Compression::Unknown,
        tile_type: TileType::Unknown,
        metadata: json!({
            "generator": format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            "sample_format": "float32le",
            "tile_encoding": "zlib",
            "tile_size": request.tuning.tile_size,
            "nodata": nodata,
        }),
    }
}

/// Run one slicing job end to end.
///
/// Setup errors (describe/open of the source, invalid zoom range or tuning, sink creation) are
/// returned before any thread starts. Per-tile failures only show up in the summary. A writer
/// error is fatal and the archive is never finalized. When `cancel` is raised the run stops
/// dispatching, drains, aborts the sink and returns an error.
pub fn run_pipeline<O, S, F>(
    opener: &O,
    open_sink: F,
    request: &PipelineRequest,
    cancel: &Arc<AtomicBool>,
) -> Result<RunSummary>
where
    O: RasterOpener,
    S: ArchiveSink,
    F: FnOnce() -> Result<S>,
{
    let mut tracker = StateTracker::new();
    let setup = (|| {
        validate_zoom_range(request.min_zoom, request.max_zoom)?;
        request.tuning.validate()?;
        let info = opener.describe().context("read source raster")?;
        let enumerator = TileEnumerator::new(&info.bounds, request.min_zoom, request.max_zoom)
            .context("enumerate tiles over the source bounds")?;
        let sources = (0..request.tuning.num_workers)
            .map(|_| opener.open())
            .collect::<Result<Vec<_>>>()
            .context("open source raster for workers")?;
        let sink = open_sink().context("open output archive")?;
        Ok::<_, anyhow::Error>((info, enumerator, sources, sink))
    })();
    let (info, enumerator, sources, sink) = match setup {
        Ok(parts) => parts,
        Err(e) => return Err(tracker.fail(e)),
    };

    let total = enumerator.count();
    debug!(
        "source: {}x{} px, {:?}, nodata {}, bounds {:?}; {} tiles over z{}..={}",
        info.width,
        info.height,
        info.crs,
        info.nodata,
        info.bounds,
        total,
        request.min_zoom,
        request.max_zoom
    );

    let bar = request.show_progress.then(|| {
        create_progress_bar(ProgressBarConfig::new(
            usize::try_from(total).unwrap_or(usize::MAX),
            "Tiles",
            Animation::Classic,
        ))
    });

    let tuning = &request.tuning;
    let channels = create_pipeline_channels(tuning);
    let encoder = TileEncoder::new(info.nodata, tuning.compression_level);
    let contexts: Vec<_> = sources
        .into_iter()
        .enumerate()
        .map(|(id, source)| WorkerContext {
            id,
            source,
            encoder,
            tile_size: tuning.tile_size,
            cancel: Arc::clone(cancel),
            progress: bar.clone(),
        })
        .collect();

    let writer_handle =
        spawn_archive_writer(sink, channels.relay_rx).map_err(|e| tracker.fail(e))?;
    let worker_handles = spawn_tile_workers(contexts, &channels.coord_rx, &channels.relay_tx)
        .map_err(|e| tracker.fail(e))?;
    let handles = PipelineHandles {
        worker_handles,
        writer_handle,
    };
    // Workers hold the only remaining copies: relay close and dispatch failure become visible.
    drop(channels.relay_tx);
    drop(channels.coord_rx);

    tracker.advance(PipelineState::Extracting);
    let mut dispatched = 0_u64;
    for coord in &enumerator {
        if cancel.load(Ordering::Relaxed) {
            debug!("cancel requested after {dispatched} dispatched tiles");
            break;
        }
        if channels.coord_tx.send(coord).is_err() {
            // Every worker is gone; only happens when the relay closed under them.
            debug!("dispatch channel closed after {dispatched} tiles");
            break;
        }
        dispatched += 1;
    }
    drop(channels.coord_tx);

    tracker.advance(PipelineState::Draining);
    let mut stats = WorkerStats::default();
    let mut lost_workers = 0_usize;
    for handle in handles.worker_handles {
        match handle.join() {
            Ok(s) => stats.merge(s),
            Err(_) => lost_workers += 1,
        }
    }
    if lost_workers > 0 {
        error!("{lost_workers} tile worker thread(s) panicked outside a tile invocation");
    }
    let outcome = handles
        .writer_handle
        .join()
        .map_err(|_| anyhow!("archive writer thread panicked"));
    if let Some(bar) = &bar {
        refresh_bar(bar);
        eprintln!();
    }

    let outcome = match outcome.and_then(|r| r) {
        Ok(outcome) => outcome,
        Err(e) => {
            return Err(tracker.fail(e.context("archive writer failed; output discarded")));
        }
    };
    report_failed_tiles(stats.failed, &stats.failed_sample, request.verbose);

    if cancel.load(Ordering::Relaxed) {
        outcome
            .sink
            .abort()
            .context("discard partial archive")
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(PipelineState::Cancelled);
        bail!(
            "cancelled after {} of {} tiles; partial output removed",
            stats.processed,
            total
        );
    }
    if lost_workers > 0 || dispatched != total {
        outcome
            .sink
            .abort()
            .context("discard partial archive")
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(PipelineState::Failed);
        bail!("tile pool stopped early ({dispatched} of {total} tiles dispatched)");
    }
    if outcome.appended != stats.pushed {
        debug!(
            "writer appended {} tiles, workers pushed {}",
            outcome.appended, stats.pushed
        );
    }

    let archive = outcome
        .sink
        .finalize(archive_header(&info, request))
        .context("finalize archive")
        .map_err(|e| tracker.fail(e))?;
    tracker.advance(PipelineState::Finalized);

    Ok(RunSummary {
        enumerated: usize::try_from(total).unwrap_or(usize::MAX),
        written: outcome.appended,
        empty: stats.empty,
        failed: stats.failed,
        unique_payloads: archive.tile_contents,
        archive_bytes: archive.archive_bytes,
        workers: tuning.num_workers,
        state: tracker.state,
    })
}
