//! The single archive-writing thread.

use anyhow::{Context, Result};
use log::debug;
use std::thread::{self, JoinHandle};

use crate::TilePayload;
use crate::archive::ArchiveSink;
use crate::pipeline::relay::RelayReceiver;

/// Handed back to the coordinator once the relay is drained.
pub struct WriterOutcome<S> {
    pub sink: S,
    pub appended: usize,
}

/// Drain `relay_rx` in arrival order into `sink`. Returns the sink so the coordinator decides
/// whether to finalize or abort. An append error ends the thread and drops the receiver, which
/// unblocks any worker waiting in `push`.
pub fn spawn_archive_writer<S: ArchiveSink>(
    mut sink: S,
    relay_rx: RelayReceiver<TilePayload>,
) -> Result<JoinHandle<Result<WriterOutcome<S>>>> {
    thread::Builder::new()
        .name("archive-writer".into())
        .spawn(move || {
            let mut appended = 0_usize;
            while let Some(payload) = relay_rx.pop() {
                sink.append(payload.tile_id, &payload.data)
                    .with_context(|| format!("append tile id {}", payload.tile_id))?;
                appended += 1;
            }
            debug!("writer: relay closed after {appended} tiles");
            Ok(WriterOutcome { sink, appended })
        })
        .context("spawn archive writer")
}
