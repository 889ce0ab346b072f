use chrono::DateTime;
use chrono::Utc;
use nanoid::nanoid;
use tracing::debug;
use tracing::warn;

use super::batch_body_limit;
use super::body_limit;
use super::collation::collate;
use super::packing::pack;
use super::wire::apply_field_mask;
use super::wire::json_array;
use super::wire::MonitoredItemMessage;
use super::EncoderMetrics;
use super::EncoderMetricsSnapshot;
use super::EncoderSettings;
use super::MessageEncoder;
use crate::constants::CONTENT_ENCODING_UTF8;
use crate::constants::CONTENT_TYPE_BINARY;
use crate::constants::CONTENT_TYPE_JSON;
use crate::constants::MESSAGE_SCHEMA_MONITORED_ITEM_BINARY;
use crate::constants::MESSAGE_SCHEMA_MONITORED_ITEM_JSON;
use crate::DataSetContentMask;
use crate::DataSetFieldContentMask;
use crate::MessageEncoding;
use crate::NetworkMessageModel;
use crate::Result;
use crate::SubscriptionNotificationModel;

/// Bincode of the leading batch flag
const BINARY_FLAG_SIZE: usize = 1;
/// Bincode of the batch flag plus the u64 element count
const BINARY_BATCH_FRAME: usize = BINARY_FLAG_SIZE + 8;
/// `[` and `]`
const JSON_BATCH_FRAME: usize = 2;

/// One encoded sample with the bookkeeping needed to emit it
struct EncodedSample {
    body: Vec<u8>,
    notification_count: usize,
    timestamp: DateTime<Utc>,
}

/// "Samples" encoder: every value change (or collated event) becomes one
/// flat record; batch mode packs records into arrays.
pub struct MonitoredItemMessageEncoder {
    settings: EncoderSettings,
    metrics: EncoderMetrics,
}

impl MonitoredItemMessageEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            metrics: EncoderMetrics::default(),
        }
    }

    fn samples(
        &self,
        bundles: &[SubscriptionNotificationModel],
    ) -> Result<Vec<EncodedSample>> {
        let mut encoded = Vec::new();
        for bundle in bundles {
            for sample in to_samples(bundle) {
                encoded.push(EncodedSample {
                    body: self.serialize(&sample.0)?,
                    notification_count: sample.1,
                    timestamp: bundle.timestamp,
                });
            }
        }
        Ok(encoded)
    }

    fn serialize(
        &self,
        sample: &MonitoredItemMessage,
    ) -> Result<Vec<u8>> {
        Ok(match self.settings.encoding {
            MessageEncoding::Json => {
                serde_json::to_vec(&sample.to_json(!self.settings.use_standards_compliant_encoding))?
            }
            MessageEncoding::Binary => bincode::serialize(sample)?,
        })
    }

    fn network_message(
        &self,
        body: Vec<u8>,
        notification_count: usize,
        timestamp: DateTime<Utc>,
    ) -> NetworkMessageModel {
        let (content_type, content_encoding, message_schema) = match self.settings.encoding {
            MessageEncoding::Json => (
                CONTENT_TYPE_JSON,
                Some(CONTENT_ENCODING_UTF8.to_string()),
                MESSAGE_SCHEMA_MONITORED_ITEM_JSON,
            ),
            MessageEncoding::Binary => (CONTENT_TYPE_BINARY, None, MESSAGE_SCHEMA_MONITORED_ITEM_BINARY),
        };
        self.metrics.record_message(body.len(), notification_count);
        NetworkMessageModel {
            message_id: nanoid!(),
            writer_group_id: self.settings.writer_group_id.clone(),
            body,
            content_type: content_type.to_string(),
            content_encoding,
            message_schema: message_schema.to_string(),
            routing_info: self
                .settings
                .enable_routing_info
                .then(|| self.settings.writer_group_id.clone()),
            timestamp,
            notification_count,
        }
    }

    fn drop_oversized(
        &self,
        sample: &EncodedSample,
        limit: usize,
    ) {
        warn!(
            "[{}] dropping notification of {} bytes, limit is {} bytes",
            self.settings.writer_group_id,
            sample.body.len(),
            limit
        );
        self.metrics.record_dropped(sample.notification_count as u64);
    }
}

impl MessageEncoder for MonitoredItemMessageEncoder {
    fn encode(
        &self,
        notifications: &[SubscriptionNotificationModel],
        max_message_size: usize,
    ) -> Result<Vec<NetworkMessageModel>> {
        let limit = body_limit(max_message_size);
        let mut messages = Vec::new();
        for sample in self.samples(notifications)? {
            let body = match self.settings.encoding {
                MessageEncoding::Json => sample.body.clone(),
                MessageEncoding::Binary => {
                    let mut body = bincode::serialize(&false)?;
                    body.extend_from_slice(&sample.body);
                    body
                }
            };
            if body.len() > limit {
                self.drop_oversized(&sample, limit);
                continue;
            }
            self.metrics.record_processed(sample.notification_count as u64);
            messages.push(self.network_message(body, sample.notification_count, sample.timestamp));
        }
        self.metrics.record_split(notifications.len(), messages.len());
        Ok(messages)
    }

    fn encode_batch(
        &self,
        notifications: &[SubscriptionNotificationModel],
        max_message_size: usize,
    ) -> Result<Vec<NetworkMessageModel>> {
        let limit = batch_body_limit(max_message_size);
        let (frame, separator) = match self.settings.encoding {
            MessageEncoding::Json => (JSON_BATCH_FRAME, 1),
            MessageEncoding::Binary => (BINARY_BATCH_FRAME, 0),
        };
        let packed = pack(self.samples(notifications)?, |s| s.body.len(), frame, separator, limit);
        for sample in &packed.oversized {
            self.drop_oversized(sample, limit);
        }

        let mut messages = Vec::with_capacity(packed.chunks.len());
        for chunk in packed.chunks {
            let count: usize = chunk.iter().map(|s| s.notification_count).sum();
            let timestamp = chunk.first().map(|s| s.timestamp).unwrap_or_else(Utc::now);
            let body = match self.settings.encoding {
                MessageEncoding::Json => {
                    let items: Vec<Vec<u8>> = chunk.into_iter().map(|s| s.body).collect();
                    json_array(&items)
                }
                MessageEncoding::Binary => {
                    let mut body = bincode::serialize(&true)?;
                    body.extend_from_slice(&(chunk.len() as u64).to_le_bytes());
                    for sample in chunk {
                        body.extend_from_slice(&sample.body);
                    }
                    body
                }
            };
            self.metrics.record_processed(count as u64);
            messages.push(self.network_message(body, count, timestamp));
        }
        self.metrics.record_split(notifications.len(), messages.len());
        debug!(
            "[{}] encoded {} bundles into {} messages",
            self.settings.writer_group_id,
            notifications.len(),
            messages.len()
        );
        Ok(messages)
    }

    fn metrics(&self) -> EncoderMetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Flatten one subscription notification into samples honoring the
/// writer's content masks; pairs each sample with the notifications it covers
fn to_samples(bundle: &SubscriptionNotificationModel) -> Vec<(MonitoredItemMessage, usize)> {
    let (content_mask, field_mask, extension_fields) = match &bundle.context {
        Some(context) => (
            context.data_set_content_mask,
            context.field_content_mask,
            Some(context.extension_fields.clone()),
        ),
        None => (DataSetContentMask::default(), DataSetFieldContentMask::default(), None),
    };
    let has = |flag: DataSetContentMask| content_mask.contains(flag);

    collate(&bundle.notifications)
        .into_iter()
        .map(|change| {
            let mut value = change.value.clone();
            if change.first.is_heartbeat
                && !has(DataSetContentMask::TIMESTAMP)
                && field_mask.contains(DataSetFieldContentMask::SOURCE_TIMESTAMP)
            {
                value.source_timestamp = Some(bundle.timestamp);
            }
            let sample = MonitoredItemMessage {
                node_id: has(DataSetContentMask::NODE_ID).then(|| change.first.node_id.clone()),
                display_name: has(DataSetContentMask::DISPLAY_NAME)
                    .then(|| change.first.display_name.clone())
                    .flatten(),
                endpoint_url: has(DataSetContentMask::ENDPOINT_URL).then(|| bundle.endpoint_url.clone()),
                application_uri: has(DataSetContentMask::APPLICATION_URI)
                    .then(|| bundle.application_uri.clone())
                    .flatten(),
                data_set_writer_id: has(DataSetContentMask::DATA_SET_WRITER_ID)
                    .then(|| bundle.data_set_writer_name().to_string()),
                value: apply_field_mask(&value, field_mask),
                timestamp: has(DataSetContentMask::TIMESTAMP).then_some(bundle.timestamp),
                sequence_number: has(DataSetContentMask::SEQUENCE_NUMBER)
                    .then(|| change.first.sequence_number.unwrap_or(bundle.sequence_number)),
                extension_fields: has(DataSetContentMask::EXTENSION_FIELDS)
                    .then(|| extension_fields.clone())
                    .flatten()
                    .filter(|f| !f.is_empty()),
            };
            (sample, change.count)
        })
        .collect()
}
