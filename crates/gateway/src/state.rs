use std::sync::Arc;

use crosstalk_accounts::AccountStore;
use crosstalk_relay::{HistoryBuffer, InviteLedger};
use serde::Serialize;
use tracing::warn;

use crate::auth::AuthGate;
use crate::fanout;
use crate::registry::ConnectionRegistry;

/// Shared state handed to every session.
///
/// Everything inside is internally shared, so the whole state clones per
/// connection without copying any data.
#[derive(Clone)]
pub struct RelayState {
    pub auth: AuthGate,
    pub invites: InviteLedger,
    pub history: HistoryBuffer,
    pub registry: ConnectionRegistry,
}

impl RelayState {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        invites: InviteLedger,
        history: HistoryBuffer,
    ) -> Self {
        Self {
            auth: AuthGate::new(accounts, invites.clone()),
            invites,
            history,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Fan a frame out to every live connection except `exclude_id`.
    ///
    /// Individual delivery failures are logged, never raised. Connections
    /// past the slow-client drop threshold are closed and unregistered
    /// after the pass.
    pub async fn broadcast<T: Serialize>(&self, frame: &T, exclude_id: Option<&str>) {
        let targets = self.registry.all_except(exclude_id).await;
        let report = fanout::deliver(frame, &targets);

        if !report.is_complete() {
            warn!(
                attempted = report.attempted,
                delivered = report.delivered,
                failed = report.failed.len(),
                "broadcast delivered partially"
            );
        }

        for connection_id in &report.evict {
            if let Some(connection) = targets.iter().find(|c| &c.id == connection_id) {
                connection.close();
            }
            self.registry.unregister(connection_id).await;
            warn!(connection_id = %connection_id, "evicted slow client");
        }
    }
}
