//! Registry of live authenticated connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::ClientConnection;

/// Tracks every live authenticated connection by its connection ID.
///
/// A user logged in from two clients holds two entries. Cheaply cloneable;
/// clones share one table.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    // Kept alongside the map so count queries never take the lock.
    active_count: AtomicUsize,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Registering an ID that is already present replaces
    /// the entry without changing the count.
    pub async fn register(&self, connection: Arc<ClientConnection>) {
        let mut connections = self.inner.connections.write().await;
        if connections
            .insert(connection.id.clone(), connection)
            .is_none()
        {
            let _ = self.inner.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection by ID. Unknown IDs are a no-op.
    pub async fn unregister(&self, connection_id: &str) {
        let mut connections = self.inner.connections.write().await;
        if connections.remove(connection_id).is_some() {
            let _ = self.inner.active_count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Snapshot the live connections, skipping `exclude_id` when given.
    pub async fn all_except(&self, exclude_id: Option<&str>) -> Vec<Arc<ClientConnection>> {
        let connections = self.inner.connections.read().await;
        connections
            .values()
            .filter(|connection| Some(connection.id.as_str()) != exclude_id)
            .cloned()
            .collect()
    }

    /// Number of live connections.
    pub fn count(&self) -> usize {
        self.inner.active_count.load(Ordering::Relaxed)
    }
}
