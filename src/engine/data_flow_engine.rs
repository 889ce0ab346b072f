use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::interval_at;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use super::BatchBuffer;
use super::BatchTimer;
use super::EngineDiagnostics;
use super::EngineSettings;
use crate::Error;
use crate::JobDiagnosticInfo;
use crate::MessageEncoder;
use crate::MessageSink;
use crate::MessageSource;
use crate::NetworkError;
use crate::Result;
use crate::SubscriptionNotificationModel;
use crate::SystemError;

/// Batching loop of one writer group: notifications are collected until
/// the batch is full or its interval elapsed, then encoded and handed to
/// the sink.
///
/// The loop is the only owner of the open batch.
pub struct DataFlowProcessingEngine {
    writer_group_id: String,
    settings: EngineSettings,
    encoder: Arc<dyn MessageEncoder>,
    sink: Arc<dyn MessageSink>,
    source: Arc<dyn MessageSource>,
    diagnostics: EngineDiagnostics,
}

impl DataFlowProcessingEngine {
    pub fn new(
        writer_group_id: &str,
        settings: EngineSettings,
        encoder: Arc<dyn MessageEncoder>,
        sink: Arc<dyn MessageSink>,
        source: Arc<dyn MessageSource>,
    ) -> Self {
        let diagnostics = EngineDiagnostics::new(writer_group_id, source.clone(), encoder.clone(), sink.clone());
        Self {
            writer_group_id: writer_group_id.to_string(),
            settings,
            encoder,
            sink,
            source,
            diagnostics,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn diagnostics(&self) -> EngineDiagnostics {
        self.diagnostics.clone()
    }

    pub fn diagnostic_info(&self) -> JobDiagnosticInfo {
        self.diagnostics.snapshot()
    }

    /// Run until cancelled or the notification stream ends. Whatever is
    /// buffered or already queued in the channel is flushed before returning.
    #[instrument(skip_all, fields(group = %self.writer_group_id))]
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<SubscriptionNotificationModel>,
        ct: CancellationToken,
    ) -> Result<()> {
        let mut buffer = BatchBuffer::new(self.settings.batch_size);
        let mut timer = BatchTimer::new(self.settings.batch_trigger_interval);
        let mut counter_reset = self.source.counter_reset();
        let mut diagnostics = self.settings.diagnostics_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        info!(
            "[{}] engine running, batch size {}, interval {:?}",
            self.writer_group_id, self.settings.batch_size, self.settings.batch_trigger_interval
        );

        loop {
            let deadline = timer.deadline();
            tokio::select! {
                biased;
                _ = ct.cancelled() => {
                    while let Ok(notification) = rx.try_recv() {
                        self.append(&mut buffer, &mut timer, notification, &ct).await?;
                    }
                    self.flush(&mut buffer, &mut timer, &ct).await?;
                    info!("[{}] engine stopped", self.writer_group_id);
                    return Ok(());
                }
                notification = rx.recv() => match notification {
                    Some(notification) => self.append(&mut buffer, &mut timer, notification, &ct).await?,
                    None => {
                        self.flush(&mut buffer, &mut timer, &ct).await?;
                        debug!("[{}] notification stream closed", self.writer_group_id);
                        return Ok(());
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    trace!("[{}] batch interval elapsed", self.writer_group_id);
                    self.flush(&mut buffer, &mut timer, &ct).await?;
                }
                Ok(()) = counter_reset.changed() => {
                    self.diagnostics.ingress.reset_ingestion();
                }
                _ = next_tick(&mut diagnostics) => {
                    self.diagnostics.report(self.settings.export_metrics);
                }
            }
        }
    }

    async fn append(
        &self,
        buffer: &mut BatchBuffer<SubscriptionNotificationModel>,
        timer: &mut BatchTimer,
        notification: SubscriptionNotificationModel,
        ct: &CancellationToken,
    ) -> Result<()> {
        trace!(
            "[{}] notification {} from {}",
            self.writer_group_id,
            notification.sequence_number,
            notification.data_set_writer_name()
        );
        self.diagnostics.ingress.mark_ingestion();
        timer.arm();
        let full = buffer.push(notification);
        self.diagnostics.ingress.buffered.store(buffer.len(), Ordering::Relaxed);
        if full.is_some() {
            self.flush(buffer, timer, ct).await?;
        }
        Ok(())
    }

    /// Encode the open batch and wait for the sink to take the messages.
    /// Once cancelled, messages the sink has no room for are dropped.
    async fn flush(
        &self,
        buffer: &mut BatchBuffer<SubscriptionNotificationModel>,
        timer: &mut BatchTimer,
        ct: &CancellationToken,
    ) -> Result<()> {
        timer.disarm();
        let batch = buffer.take();
        self.diagnostics.ingress.buffered.store(0, Ordering::Relaxed);
        if batch.is_empty() {
            return Ok(());
        }

        let max_message_size = self.settings.effective_max_message_size(self.sink.max_message_size());
        let encoded = if self.settings.batch_size > 1 {
            self.encoder.encode_batch(&batch, max_message_size)
        } else {
            self.encoder.encode(&batch, max_message_size)
        };
        let messages = match encoded {
            Ok(messages) => messages,
            Err(e) => {
                error!(
                    "[{}] failed to encode batch of {} notifications: {:?}",
                    self.writer_group_id,
                    batch.len(),
                    e
                );
                return Ok(());
            }
        };
        if messages.is_empty() {
            return Ok(());
        }
        debug!(
            "[{}] flushing {} notifications as {} messages",
            self.writer_group_id,
            batch.len(),
            messages.len()
        );
        match self.sink.send(messages, ct).await {
            Err(Error::System(SystemError::Network(NetworkError::SendAbandoned { dropped, .. }))) => {
                warn!(
                    "[{}] stopping with a full outgoing queue, dropped {} messages",
                    self.writer_group_id, dropped
                );
                Ok(())
            }
            sent => sent,
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
