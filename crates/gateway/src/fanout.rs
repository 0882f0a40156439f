//! Best-effort frame delivery to sets of connections.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::connection::ClientConnection;

/// Lifetime drop threshold past which a connection is flagged for eviction.
pub const MAX_SEND_DROPS: u64 = 100;

/// Outcome of one fan-out pass.
#[derive(Debug, Default)]
pub struct FanoutReport {
    /// Connections the frame was offered to.
    pub attempted: usize,
    /// Connections that accepted the frame.
    pub delivered: usize,
    /// IDs whose send was dropped this pass.
    pub failed: Vec<String>,
    /// IDs past [`MAX_SEND_DROPS`] total drops; callers should evict these.
    pub evict: Vec<String>,
}

impl FanoutReport {
    /// True when every offered send was accepted.
    pub fn is_complete(&self) -> bool {
        self.delivered == self.attempted
    }
}

/// Serialize `event` once and offer the frame to every target independently.
///
/// A failed send never aborts the pass and never surfaces as an error; it is
/// recorded in the report for the caller to log.
pub fn deliver<T: Serialize>(event: &T, targets: &[Arc<ClientConnection>]) -> FanoutReport {
    let frame = match serde_json::to_string(event) {
        Ok(json) => Arc::new(json),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound frame");
            return FanoutReport::default();
        }
    };

    let mut report = FanoutReport {
        attempted: targets.len(),
        ..FanoutReport::default()
    };

    for connection in targets {
        if connection.send(Arc::clone(&frame)) {
            report.delivered += 1;
            continue;
        }

        let drops = connection.drop_count();
        if drops >= MAX_SEND_DROPS {
            warn!(
                connection_id = %connection.id,
                username = %connection.username,
                drops,
                "flagging slow client for eviction"
            );
            report.evict.push(connection.id.clone());
        } else {
            debug!(
                connection_id = %connection.id,
                username = %connection.username,
                drops,
                "dropped frame for slow client"
            );
        }
        report.failed.push(connection.id.clone());
    }

    report
}
