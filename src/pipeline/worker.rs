//! Tile workers: extract, resample, encode, push. One decoder handle per worker.

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use log::{debug, warn};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use crate::engine::encode::TileEncoder;
use crate::engine::progress::BatchedProgress;
use crate::pipeline::context::WorkerContext;
use crate::pipeline::error_handler::MAX_REPORTED_FAILURES;
use crate::pipeline::relay::RelaySender;
use crate::raster::RasterSource;
use crate::utils::config::ProgressConsts;
use crate::{TileCoord, TilePayload};

/// Per-worker tallies, returned through the join handle and summed by the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub pushed: usize,
    pub empty: usize,
    pub failed: usize,
    /// First few failed coordinates, for the final report.
    pub failed_sample: Vec<TileCoord>,
}

impl WorkerStats {
    pub fn merge(&mut self, other: WorkerStats) {
        self.processed += other.processed;
        self.pushed += other.pushed;
        self.empty += other.empty;
        self.failed += other.failed;
        let room = MAX_REPORTED_FAILURES.saturating_sub(self.failed_sample.len());
        self.failed_sample
            .extend(other.failed_sample.into_iter().take(room));
    }

    fn record_failure(&mut self, coord: TileCoord) {
        self.failed += 1;
        if self.failed_sample.len() < MAX_REPORTED_FAILURES {
            self.failed_sample.push(coord);
        }
    }
}

/// One extractor + encoder invocation.
pub fn process_tile<S: RasterSource + ?Sized>(
    source: &mut S,
    encoder: &TileEncoder,
    coord: TileCoord,
    tile_size: u32,
) -> Result<Option<TilePayload>> {
    let grid = source
        .read_tile(coord, tile_size)
        .with_context(|| format!("extract tile {coord}"))?;
    encoder.encode(coord, &grid)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Single worker: pull coordinates until the dispatch channel closes, the run is cancelled, or
/// the relay is gone. Errors and panics stay inside the tile that caused them.
fn tile_worker_loop<S: RasterSource>(
    mut ctx: WorkerContext<S>,
    coord_rx: Receiver<TileCoord>,
    relay_tx: RelaySender<TilePayload>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut progress =
        BatchedProgress::new(ctx.progress.take(), ProgressConsts::PROGRESS_UPDATE_BATCH_SIZE);

    while let Ok(coord) = coord_rx.recv() {
        if ctx.cancel.load(Ordering::Relaxed) {
            break;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            process_tile(&mut ctx.source, &ctx.encoder, coord, ctx.tile_size)
        }));
        stats.processed += 1;
        progress.tick();
        match outcome {
            Ok(Ok(Some(payload))) => {
                if relay_tx.push(payload).is_err() {
                    debug!("worker {}: relay closed, stopping", ctx.id);
                    break;
                }
                stats.pushed += 1;
            }
            Ok(Ok(None)) => stats.empty += 1,
            Ok(Err(e)) => {
                warn!("Tile {coord} skipped: {e:#}");
                stats.record_failure(coord);
            }
            Err(panic) => {
                warn!("Tile {coord} skipped: worker panicked: {}", panic_message(&*panic));
                stats.record_failure(coord);
            }
        }
    }
    progress.flush();
    debug!(
        "worker {}: {} processed, {} pushed, {} empty, {} failed",
        ctx.id, stats.processed, stats.pushed, stats.empty, stats.failed
    );
    stats
}

/// Spawn one worker per context. Each gets a clone of `coord_rx` and `relay_tx`; the caller
/// must drop its own copies afterwards so channel close is observed.
pub fn spawn_tile_workers<S: RasterSource + Send + 'static>(
    contexts: Vec<WorkerContext<S>>,
    coord_rx: &Receiver<TileCoord>,
    relay_tx: &RelaySender<TilePayload>,
) -> Result<Vec<JoinHandle<WorkerStats>>> {
    contexts
        .into_iter()
        .map(|ctx| {
            let coord_rx = coord_rx.clone();
            let relay_tx = relay_tx.clone();
            thread::Builder::new()
                .name(format!("tile-worker-{}", ctx.id))
                .spawn(move || tile_worker_loop(ctx, coord_rx, relay_tx))
                .context("spawn tile worker")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelGrid;

    struct Flaky;

    impl RasterSource for Flaky {
        fn nodata(&self) -> f32 {
            0.0
        }

        fn read_tile(&mut self, coord: TileCoord, tile_size: u32) -> Result<PixelGrid> {
            match coord.x {
                0 => Ok(PixelGrid::filled(tile_size, tile_size, 1.0)),
                1 => Ok(PixelGrid::filled(tile_size, tile_size, 0.0)),
                2 => anyhow::bail!("corrupt block"),
                _ => panic!("decoder blew up"),
            }
        }
    }

    #[test]
    fn process_tile_outcomes() {
        let encoder = TileEncoder::new(0.0, 1);
        let mut source = Flaky;
        assert!(process_tile(&mut source, &encoder, TileCoord::new(2, 0, 0), 4)
            .unwrap()
            .is_some());
        assert!(process_tile(&mut source, &encoder, TileCoord::new(2, 1, 0), 4)
            .unwrap()
            .is_none());
        assert!(process_tile(&mut source, &encoder, TileCoord::new(2, 2, 0), 4).is_err());
    }

    #[test]
    fn stats_merge_caps_sample() {
        let mut total = WorkerStats::default();
        for i in 0..3 {
            let mut s = WorkerStats::default();
            for x in 0..10 {
                s.record_failure(TileCoord::new(5, x, i));
            }
            total.merge(s);
        }
        assert_eq!(total.failed, 30);
        assert_eq!(total.failed_sample.len(), MAX_REPORTED_FAILURES);
    }
}
