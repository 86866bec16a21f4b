//! Pipeline components: context, relay, workers, writer, coordinator.

pub mod context;
pub mod error_handler;
pub mod orchestrator;
pub mod relay;
pub mod worker;
pub mod writer;

pub use context::{
    PipelineChannels, PipelineHandles, PipelineTuning, WorkerContext, create_pipeline_channels,
};
pub use error_handler::report_failed_tiles;
pub use orchestrator::{PipelineRequest, archive_header, run_pipeline};
pub use relay::{RelayClosed, RelayReceiver, RelaySender, relay_queue};
pub use worker::{WorkerStats, process_tile, spawn_tile_workers};
pub use writer::{WriterOutcome, spawn_archive_writer};
