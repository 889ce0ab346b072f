use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Size of one billable transport chunk
pub const MESSAGE_CHUNK_SIZE: f64 = 4096.0;

/// Point in time snapshot of a writer group's pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDiagnosticInfo {
    pub writer_group_id: String,
    pub timestamp: DateTime<Utc>,
    pub ingestion_duration: Duration,

    // Triggers
    pub ingress_data_changes: u64,
    pub ingress_value_changes: u64,
    pub ingress_events: u64,
    pub ingress_data_changes_in_last_minute: u64,
    pub ingress_value_changes_in_last_minute: u64,
    pub ingress_events_in_last_minute: u64,
    pub connection_retries: u64,
    pub connections_ok: usize,
    pub connections_total: usize,
    pub good_nodes: u64,
    pub bad_nodes: u64,

    // Engine
    pub ingress_batch_block_buffer_size: usize,

    // Encoder
    pub encoder_notifications_processed: u64,
    pub encoder_notifications_dropped: u64,
    pub encoder_messages_processed: u64,
    pub encoder_avg_notifications_per_message: f64,
    pub encoder_avg_message_body_size: f64,
    pub encoder_max_message_split_ratio: f64,

    // Sink
    pub outgress_input_buffer_count: usize,
    pub outgress_capacity: usize,
    pub outgress_sent_messages: u64,
    pub sent_messages_per_sec: f64,
    pub estimated_message_chunks_per_day: f64,
}

impl JobDiagnosticInfo {
    /// Derive rates from the absolute counters
    pub fn compute_rates(&mut self) {
        let secs = self.ingestion_duration.as_secs_f64();
        self.sent_messages_per_sec = if secs > 0.0 {
            self.outgress_sent_messages as f64 / secs
        } else {
            0.0
        };
        let chunks_per_message = (self.encoder_avg_message_body_size / MESSAGE_CHUNK_SIZE).ceil();
        self.estimated_message_chunks_per_day = chunks_per_message * self.sent_messages_per_sec * 86_400.0;
    }
}
