//! Pipeline context and tuning: what the coordinator hands to each worker and to the writer.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::JoinHandle;

use crate::engine::encode::TileEncoder;
use crate::engine::progress::ProgressBar;
use crate::pipeline::relay::{RelayReceiver, RelaySender, relay_queue};
use crate::pipeline::worker::WorkerStats;
use crate::pipeline::writer::WriterOutcome;
use crate::utils::config::{DISPATCH_BUFFER_PER_WORKER, TileConsts};
use crate::{Opts, TileCoord, TilePayload};

/// Sizes for one run: pool, queues, tiles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineTuning {
    pub num_workers: usize,
    /// Relay capacity (encoded tiles in flight).
    pub queue_capacity: usize,
    pub tile_size: u32,
    pub compression_level: u32,
}

impl PipelineTuning {
    pub fn from_opts(opts: &Opts, num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            queue_capacity: opts.queue_capacity.max(1),
            tile_size: opts.tile_size,
            compression_level: opts.compression_level,
        }
    }

    /// Coordinates buffered ahead of the pool.
    pub fn dispatch_capacity(&self) -> usize {
        self.num_workers * DISPATCH_BUFFER_PER_WORKER
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tile_size == 0 || self.tile_size > TileConsts::MAX_TILE_SIZE {
            anyhow::bail!(
                "tile size {} is outside 1..={}",
                self.tile_size,
                TileConsts::MAX_TILE_SIZE
            );
        }
        if self.compression_level > 9 {
            anyhow::bail!("compression level {} is outside 0..=9", self.compression_level);
        }
        Ok(())
    }
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self::from_opts(&Opts::default(), 1)
    }
}

/// Dispatch channel (coordinator → workers) and relay (workers → writer).
pub struct PipelineChannels {
    pub coord_tx: Sender<TileCoord>,
    pub coord_rx: Receiver<TileCoord>,
    pub relay_tx: RelaySender<TilePayload>,
    pub relay_rx: RelayReceiver<TilePayload>,
}

pub fn create_pipeline_channels(tuning: &PipelineTuning) -> PipelineChannels {
    let (coord_tx, coord_rx) = bounded::<TileCoord>(tuning.dispatch_capacity());
    let (relay_tx, relay_rx) = relay_queue::<TilePayload>(tuning.queue_capacity);
    PipelineChannels {
        coord_tx,
        coord_rx,
        relay_tx,
        relay_rx,
    }
}

/// Everything one worker owns for its whole life. Built on the coordinator thread during Init
/// and moved into the worker; nothing in here is shared except the cancel flag and the bar.
pub struct WorkerContext<S> {
    pub id: usize,
    pub source: S,
    pub encoder: TileEncoder,
    pub tile_size: u32,
    pub cancel: Arc<AtomicBool>,
    pub progress: Option<ProgressBar>,
}

/// Threads the coordinator joins: all workers first, then the writer.
pub struct PipelineHandles<S> {
    pub worker_handles: Vec<JoinHandle<WorkerStats>>,
    pub writer_handle: JoinHandle<anyhow::Result<WriterOutcome<S>>>,
}
