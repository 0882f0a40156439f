//! Per-client connection state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// An authenticated WebSocket client.
///
/// Holds the bounded channel feeding the connection's write task. Sends are
/// non-blocking: a full or closed channel drops the frame and counts it, so
/// one stalled client never holds up a broadcast pass.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// Username bound at authentication.
    pub username: String,
    /// Send half of the write task's channel. Taken on close so the write
    /// task drains its queue and exits.
    tx: Mutex<Option<mpsc::Sender<Arc<String>>>>,
    /// Frames dropped because the channel was full or closed.
    dropped_frames: AtomicU64,
}

impl ClientConnection {
    pub fn new(id: String, username: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            username,
            tx: Mutex::new(Some(tx)),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Queue a frame for delivery.
    ///
    /// Returns `false` when the frame was dropped because the channel is
    /// full or closed, and increments the drop counter.
    pub fn send(&self, frame: Arc<String>) -> bool {
        let queued = match self.tx.lock().as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        };
        if !queued {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
        }
        queued
    }

    /// Frames dropped over the connection's lifetime.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Drop the send half. Queued frames still drain to the write task,
    /// after which it observes the closed channel and exits.
    pub fn close(&self) {
        let _ = self.tx.lock().take();
    }
}
