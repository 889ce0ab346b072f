use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::MessageSink;
use crate::NetworkError;
use crate::NetworkMessageModel;
use crate::Result;
use crate::SinkHealth;

/// Sink that records every `send` call with the (tokio) time it happened
pub struct RecordingSink {
    max_message_size: usize,
    sends: Mutex<Vec<(Instant, Vec<NetworkMessageModel>)>>,
    closed: Mutex<bool>,
    health: watch::Sender<SinkHealth>,
}

impl RecordingSink {
    pub fn new(max_message_size: usize) -> Arc<Self> {
        let (health, _) = watch::channel(SinkHealth::Healthy);
        Arc::new(Self {
            max_message_size,
            sends: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
            health,
        })
    }

    pub fn sends(&self) -> Vec<(Instant, Vec<NetworkMessageModel>)> {
        self.sends.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sends.lock().len()
    }

    /// Notifications carried by everything sent so far
    pub fn notification_count(&self) -> usize {
        self.sends
            .lock()
            .iter()
            .flat_map(|(_, messages)| messages.iter())
            .map(|m| m.notification_count)
            .sum()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    async fn send(
        &self,
        messages: Vec<NetworkMessageModel>,
        _ct: &CancellationToken,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(NetworkError::SinkClosed("recording".to_string()).into());
        }
        self.sends.lock().push((Instant::now(), messages));
        Ok(())
    }

    fn sent_messages_count(&self) -> u64 {
        self.sends.lock().iter().map(|(_, m)| m.len() as u64).sum()
    }

    fn queued_messages(&self) -> usize {
        0
    }

    fn capacity(&self) -> usize {
        16
    }

    fn health(&self) -> watch::Receiver<SinkHealth> {
        self.health.subscribe()
    }

    async fn close(&self) {
        *self.closed.lock() = true;
    }
}
