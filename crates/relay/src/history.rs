use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::RelayMessage;

/// Bounded, shared chat history.
///
/// Keeps the most recent messages in arrival order and hands newcomers a
/// point-in-time copy. Cheaply cloneable; clones share one buffer.
#[derive(Clone)]
pub struct HistoryBuffer {
    messages: Arc<Mutex<VecDeque<RelayMessage>>>,
    capacity: usize,
}

impl HistoryBuffer {
    /// Create a buffer retaining at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append a message, evicting the oldest entries once the buffer is full.
    pub async fn append(&self, message: RelayMessage) {
        if self.capacity == 0 {
            return;
        }

        let mut messages = self.messages.lock().await;
        while messages.len() >= self.capacity {
            messages.pop_front();
        }
        messages.push_back(message);
    }

    /// Copy the current contents, oldest first.
    pub async fn snapshot(&self) -> Vec<RelayMessage> {
        self.messages.lock().await.iter().cloned().collect()
    }
}
