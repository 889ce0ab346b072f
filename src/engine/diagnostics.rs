use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::info;

use crate::JobDiagnosticInfo;
use crate::MessageEncoder;
use crate::MessageSink;
use crate::MessageSource;

/// Engine side state the diagnostics read while the batching loop runs
#[derive(Debug, Default)]
pub(crate) struct IngressState {
    pub(crate) buffered: AtomicUsize,
    /// First notification since start or the last counter reset
    ingestion_start: Mutex<Option<Instant>>,
}

impl IngressState {
    pub(crate) fn mark_ingestion(&self) {
        self.ingestion_start.lock().get_or_insert_with(Instant::now);
    }

    pub(crate) fn reset_ingestion(&self) {
        *self.ingestion_start.lock() = None;
    }

    fn ingestion_duration(&self) -> std::time::Duration {
        self.ingestion_start
            .lock()
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }
}

/// Combines trigger, engine, encoder and sink counters of one writer group
#[derive(Clone)]
pub struct EngineDiagnostics {
    writer_group_id: String,
    source: Arc<dyn MessageSource>,
    encoder: Arc<dyn MessageEncoder>,
    sink: Arc<dyn MessageSink>,
    pub(crate) ingress: Arc<IngressState>,
}

impl EngineDiagnostics {
    pub fn new(
        writer_group_id: &str,
        source: Arc<dyn MessageSource>,
        encoder: Arc<dyn MessageEncoder>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            writer_group_id: writer_group_id.to_string(),
            source,
            encoder,
            sink,
            ingress: Arc::new(IngressState::default()),
        }
    }

    pub fn snapshot(&self) -> JobDiagnosticInfo {
        let mut info = JobDiagnosticInfo {
            writer_group_id: self.writer_group_id.clone(),
            timestamp: Utc::now(),
            ingestion_duration: self.ingress.ingestion_duration(),
            ingress_batch_block_buffer_size: self.ingress.buffered.load(Ordering::Relaxed),
            ..Default::default()
        };

        for (_, counters) in self.source.counters() {
            info.ingress_value_changes += counters.value_changes;
            info.ingress_data_changes += counters.data_changes;
            info.ingress_events += counters.events;
            info.ingress_value_changes_in_last_minute += counters.value_changes_last_minute;
            info.ingress_data_changes_in_last_minute += counters.data_changes_last_minute;
            info.ingress_events_in_last_minute += counters.events_last_minute;
            info.connection_retries += counters.connection_retries;
            info.good_nodes += counters.good_nodes;
            info.bad_nodes += counters.bad_nodes;
            info.connections_total += 1;
            if counters.is_connection_ok {
                info.connections_ok += 1;
            }
        }

        let encoder = self.encoder.metrics();
        info.encoder_notifications_processed = encoder.notifications_processed;
        info.encoder_notifications_dropped = encoder.notifications_dropped;
        info.encoder_messages_processed = encoder.messages_processed;
        info.encoder_avg_notifications_per_message = encoder.avg_notifications_per_message;
        info.encoder_avg_message_body_size = encoder.avg_message_size;
        info.encoder_max_message_split_ratio = encoder.max_message_split_ratio;

        info.outgress_input_buffer_count = self.sink.queued_messages();
        info.outgress_capacity = self.sink.capacity();
        info.outgress_sent_messages = self.sink.sent_messages_count();
        info.compute_rates();
        info
    }

    /// Log a snapshot, export it when asked to, and hand it back
    pub fn report(
        &self,
        export_metrics: bool,
    ) -> JobDiagnosticInfo {
        let info = self.snapshot();
        info!(
            group = %info.writer_group_id,
            ingestion_duration = ?info.ingestion_duration,
            ingress_data_changes = info.ingress_data_changes,
            ingress_value_changes = info.ingress_value_changes,
            ingress_events = info.ingress_events,
            ingress_value_changes_last_minute = info.ingress_value_changes_in_last_minute,
            ingress_batch_buffer_size = info.ingress_batch_block_buffer_size,
            encoder_notifications_processed = info.encoder_notifications_processed,
            encoder_notifications_dropped = info.encoder_notifications_dropped,
            encoder_messages_processed = info.encoder_messages_processed,
            encoder_avg_notifications_per_message = info.encoder_avg_notifications_per_message,
            encoder_avg_message_body_size = info.encoder_avg_message_body_size,
            encoder_max_message_split_ratio = info.encoder_max_message_split_ratio,
            estimated_message_chunks_per_day = info.estimated_message_chunks_per_day,
            outgress_input_buffer_count = info.outgress_input_buffer_count,
            outgress_capacity = info.outgress_capacity,
            outgress_sent_messages = info.outgress_sent_messages,
            sent_messages_per_sec = info.sent_messages_per_sec,
            connection_retries = info.connection_retries,
            connections_ok = info.connections_ok,
            connections_total = info.connections_total,
            good_nodes = info.good_nodes,
            bad_nodes = info.bad_nodes,
            "diagnostics"
        );
        if export_metrics {
            crate::metrics::record_diagnostics(&info);
        }
        info
    }
}
