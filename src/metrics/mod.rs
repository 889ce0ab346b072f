//! Prometheus gauges fed from writer group diagnostics snapshots.
//!
//! Every gauge is labelled with the writer group id. The embedding process
//! decides how to expose `gather_text()` (HTTP endpoint, push gateway...).
use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::GaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;
use tracing::warn;

use crate::JobDiagnosticInfo;


const GROUP_LABEL: &str = "group";

fn group_gauge(
    name: &str,
    help: &str,
) -> GaugeVec {
    GaugeVec::new(Opts::new(name, help), &[GROUP_LABEL]).expect("metric can not be created")
}

lazy_static! {
    pub static ref INGRESS_VALUE_CHANGES: GaugeVec =
        group_gauge("iiot_ingress_value_changes", "Value changes received from field devices");
    pub static ref INGRESS_VALUE_CHANGES_LAST_MINUTE: GaugeVec = group_gauge(
        "iiot_ingress_value_changes_last_minute",
        "Value changes received in the last minute"
    );
    pub static ref INGRESS_DATA_CHANGES: GaugeVec =
        group_gauge("iiot_ingress_data_changes", "Data change notifications received");
    pub static ref INGRESS_DATA_CHANGES_LAST_MINUTE: GaugeVec = group_gauge(
        "iiot_ingress_data_changes_last_minute",
        "Data change notifications received in the last minute"
    );
    pub static ref INGRESS_EVENTS: GaugeVec = group_gauge("iiot_ingress_events", "Events received");
    pub static ref INGRESS_BATCH_BUFFER_SIZE: GaugeVec =
        group_gauge("iiot_ingress_batch_buffer_size", "Notifications waiting in the open batch");
    pub static ref ENCODER_NOTIFICATIONS_PROCESSED: GaugeVec =
        group_gauge("iiot_encoder_notifications_processed", "Notifications encoded");
    pub static ref ENCODER_NOTIFICATIONS_DROPPED: GaugeVec = group_gauge(
        "iiot_encoder_notifications_dropped",
        "Notifications dropped because they exceed the message size"
    );
    pub static ref ENCODER_MESSAGES_PROCESSED: GaugeVec =
        group_gauge("iiot_encoder_messages_processed", "Network messages produced");
    pub static ref ENCODER_AVG_NOTIFICATIONS_PER_MESSAGE: GaugeVec = group_gauge(
        "iiot_encoder_avg_notifications_per_message",
        "Average notifications per network message"
    );
    pub static ref ENCODER_AVG_MESSAGE_SIZE: GaugeVec =
        group_gauge("iiot_encoder_avg_message_size", "Average network message body size in bytes");
    pub static ref ENCODER_MAX_MESSAGE_SPLIT_RATIO: GaugeVec = group_gauge(
        "iiot_encoder_max_message_split_ratio",
        "Worst ratio of messages produced to notification bundles"
    );
    pub static ref OUTGRESS_INPUT_BUFFER_COUNT: GaugeVec =
        group_gauge("iiot_outgress_input_buffer_count", "Messages queued in front of the transport");
    pub static ref OUTGRESS_SENT_MESSAGES: GaugeVec =
        group_gauge("iiot_outgress_sent_messages", "Messages accepted by the transport");
    pub static ref CONNECTION_RETRIES: GaugeVec =
        group_gauge("iiot_connection_retries", "Reconnect attempts against field devices");
    pub static ref CONNECTIONS_OK: GaugeVec =
        group_gauge("iiot_connections_ok", "Field device connections currently delivering data");
    pub static ref GOOD_NODES: GaugeVec = group_gauge("iiot_good_nodes", "Monitored nodes accepted");
    pub static ref BAD_NODES: GaugeVec = group_gauge("iiot_bad_nodes", "Monitored nodes rejected");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

fn all_gauges() -> [&'static GaugeVec; 18] {
    [
        &INGRESS_VALUE_CHANGES,
        &INGRESS_VALUE_CHANGES_LAST_MINUTE,
        &INGRESS_DATA_CHANGES,
        &INGRESS_DATA_CHANGES_LAST_MINUTE,
        &INGRESS_EVENTS,
        &INGRESS_BATCH_BUFFER_SIZE,
        &ENCODER_NOTIFICATIONS_PROCESSED,
        &ENCODER_NOTIFICATIONS_DROPPED,
        &ENCODER_MESSAGES_PROCESSED,
        &ENCODER_AVG_NOTIFICATIONS_PER_MESSAGE,
        &ENCODER_AVG_MESSAGE_SIZE,
        &ENCODER_MAX_MESSAGE_SPLIT_RATIO,
        &OUTGRESS_INPUT_BUFFER_COUNT,
        &OUTGRESS_SENT_MESSAGES,
        &CONNECTION_RETRIES,
        &CONNECTIONS_OK,
        &GOOD_NODES,
        &BAD_NODES,
    ]
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    for gauge in all_gauges() {
        if let Err(e) = registry.register(Box::new(gauge.clone())) {
            warn!("collector can not be registered: {:?}", e);
        }
    }
}

/// Publish one diagnostics snapshot
pub fn record_diagnostics(info: &JobDiagnosticInfo) {
    let group = info.writer_group_id.as_str();
    let set = |gauge: &GaugeVec, value: f64| gauge.with_label_values(&[group]).set(value);

    set(&INGRESS_VALUE_CHANGES, info.ingress_value_changes as f64);
    set(
        &INGRESS_VALUE_CHANGES_LAST_MINUTE,
        info.ingress_value_changes_in_last_minute as f64,
    );
    set(&INGRESS_DATA_CHANGES, info.ingress_data_changes as f64);
    set(
        &INGRESS_DATA_CHANGES_LAST_MINUTE,
        info.ingress_data_changes_in_last_minute as f64,
    );
    set(&INGRESS_EVENTS, info.ingress_events as f64);
    set(&INGRESS_BATCH_BUFFER_SIZE, info.ingress_batch_block_buffer_size as f64);
    set(&ENCODER_NOTIFICATIONS_PROCESSED, info.encoder_notifications_processed as f64);
    set(&ENCODER_NOTIFICATIONS_DROPPED, info.encoder_notifications_dropped as f64);
    set(&ENCODER_MESSAGES_PROCESSED, info.encoder_messages_processed as f64);
    set(
        &ENCODER_AVG_NOTIFICATIONS_PER_MESSAGE,
        info.encoder_avg_notifications_per_message,
    );
    set(&ENCODER_AVG_MESSAGE_SIZE, info.encoder_avg_message_body_size);
    set(&ENCODER_MAX_MESSAGE_SPLIT_RATIO, info.encoder_max_message_split_ratio);
    set(&OUTGRESS_INPUT_BUFFER_COUNT, info.outgress_input_buffer_count as f64);
    set(&OUTGRESS_SENT_MESSAGES, info.outgress_sent_messages as f64);
    set(&CONNECTION_RETRIES, info.connection_retries as f64);
    set(&CONNECTIONS_OK, info.connections_ok as f64);
    set(&GOOD_NODES, info.good_nodes as f64);
    set(&BAD_NODES, info.bad_nodes as f64);
}

/// Forget the series of a stopped writer group
pub fn remove_group(writer_group_id: &str) {
    for gauge in all_gauges() {
        // absent when the group never reported
        let _ = gauge.remove_label_values(&[writer_group_id]);
    }
}

/// Text exposition of every registered gauge
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(text) => text,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}
