use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::MessageSink;
use super::SinkHealth;
use super::Transport;
use crate::constants::DEFAULT_TRANSPORT_MAX_MESSAGE_SIZE;
use crate::utils::sleep_or_cancelled;
use crate::utils::task_with_timeout_and_exponential_backoff;
use crate::BackoffPolicy;
use crate::NetworkError;
use crate::NetworkMessageModel;
use crate::Result;

/// Sink with a bounded outgoing queue drained by one worker task.
///
/// `send` waits for room in the queue, which is how a slow transport slows
/// the encoder down. The wait ends when the caller's token is cancelled.
pub struct NetworkMessageSink {
    name: String,
    capacity: usize,
    max_message_size: usize,
    tx: Mutex<Option<mpsc::Sender<NetworkMessageModel>>>,
    sent: Arc<AtomicU64>,
    health_rx: watch::Receiver<SinkHealth>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    closing: CancellationToken,
}

impl NetworkMessageSink {
    pub fn new(
        name: &str,
        capacity: usize,
        transport: Arc<dyn Transport>,
        policy: BackoffPolicy,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (health_tx, health_rx) = watch::channel(SinkHealth::Healthy);
        let sent = Arc::new(AtomicU64::new(0));
        let closing = CancellationToken::new();
        let max_message_size = match transport.max_message_size() {
            0 => DEFAULT_TRANSPORT_MAX_MESSAGE_SIZE,
            n => n,
        };

        let worker = tokio::spawn(run_worker(
            name.to_string(),
            rx,
            transport,
            policy,
            sent.clone(),
            health_tx,
            closing.clone(),
        ));

        Self {
            name: name.to_string(),
            capacity,
            max_message_size,
            tx: Mutex::new(Some(tx)),
            sent,
            health_rx,
            worker: tokio::sync::Mutex::new(Some(worker)),
            closing,
        }
    }
}

#[async_trait]
impl MessageSink for NetworkMessageSink {
    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    async fn send(
        &self,
        messages: Vec<NetworkMessageModel>,
        ct: &CancellationToken,
    ) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or_else(|| NetworkError::SinkClosed(self.name.clone()))?;
        let total = messages.len();
        for (queued, message) in messages.into_iter().enumerate() {
            tokio::select! {
                biased;
                sent = tx.send(message) => {
                    sent.map_err(|_| NetworkError::SinkClosed(self.name.clone()))?;
                }
                _ = ct.cancelled() => {
                    return Err(NetworkError::SendAbandoned {
                        sink: self.name.clone(),
                        dropped: total - queued,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn sent_messages_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    fn queued_messages(&self) -> usize {
        self.tx
            .lock()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn health(&self) -> watch::Receiver<SinkHealth> {
        self.health_rx.clone()
    }

    async fn close(&self) {
        let tx = self.tx.lock().take();
        drop(tx);
        self.closing.cancel();

        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(e) = worker.await {
                error!("[{}] sink worker failed: {:?}", self.name, e);
            }
        }
        info!("[{}] sink closed after {} messages", self.name, self.sent_messages_count());
    }
}

async fn run_worker(
    name: String,
    mut rx: mpsc::Receiver<NetworkMessageModel>,
    transport: Arc<dyn Transport>,
    policy: BackoffPolicy,
    sent: Arc<AtomicU64>,
    health_tx: watch::Sender<SinkHealth>,
    closing: CancellationToken,
) {
    let cool_down = Duration::from_millis(policy.max_delay_ms);

    while let Some(message) = rx.recv().await {
        loop {
            match task_with_timeout_and_exponential_backoff(|| transport.send(&message), policy, &closing).await {
                Ok(()) => {
                    sent.fetch_add(1, Ordering::Relaxed);
                    health_tx.send_if_modified(|health| {
                        let changed = *health != SinkHealth::Healthy;
                        *health = SinkHealth::Healthy;
                        changed
                    });
                    debug!("[{}] sent message {}", name, message.message_id);
                    break;
                }
                Err(e) => {
                    error!("[{}] transport send failed: {:?}", name, e);
                    health_tx.send_replace(SinkHealth::Unhealthy);

                    if !sleep_or_cancelled(cool_down, &closing).await {
                        let mut dropped = 1;
                        while rx.try_recv().is_ok() {
                            dropped += 1;
                        }
                        warn!("[{}] closing with transport down, dropped {} messages", name, dropped);
                        return;
                    }
                }
            }
        }
    }
    debug!("[{}] outgoing queue drained", name);
}
