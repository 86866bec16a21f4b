//! Bounded relay between the tile workers and the archive writer.
//!
//! A full queue blocks `push` (backpressure caps in-flight payloads); an empty queue blocks
//! `pop`. End of stream is the last sender being dropped; no polling is involved. Dropping the
//! receiver (writer failure) makes every pending and future `push` fail so producers can't hang.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::fmt;

/// Returned by [`RelaySender::push`] once the consumer is gone. Carries the rejected item.
#[derive(Debug, PartialEq, Eq)]
pub struct RelayClosed<T>(pub T);

impl<T> fmt::Display for RelayClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("relay queue closed")
    }
}

impl<T: fmt::Debug> std::error::Error for RelayClosed<T> {}

/// Producer side. Clone one per worker.
pub struct RelaySender<T> {
    tx: Sender<T>,
}

impl<T> Clone for RelaySender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> RelaySender<T> {
    /// Blocks while the queue is full.
    pub fn push(&self, item: T) -> Result<(), RelayClosed<T>> {
        self.tx.send(item).map_err(|e| RelayClosed(e.into_inner()))
    }
}

/// Consumer side. Exactly one, owned by the archive writer.
pub struct RelayReceiver<T> {
    rx: Receiver<T>,
}

impl<T> RelayReceiver<T> {
    /// Blocks until an item arrives. `None` once every sender is gone and the queue is drained.
    pub fn pop(&self) -> Option<T> {
        self.rx.recv().ok()
    }
}

impl<T> Iterator for RelayReceiver<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.pop()
    }
}

/// Fixed-capacity relay. `capacity` is clamped to at least one.
pub fn relay_queue<T>(capacity: usize) -> (RelaySender<T>, RelayReceiver<T>) {
    let (tx, rx) = bounded(capacity.max(1));
    (RelaySender { tx }, RelayReceiver { rx })
}
