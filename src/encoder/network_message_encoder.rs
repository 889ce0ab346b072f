use std::collections::BTreeMap;
use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use nanoid::nanoid;
use parking_lot::Mutex;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use super::batch_body_limit;
use super::body_limit;
use super::collation::collate;
use super::packing::pack;
use super::wire::apply_field_mask;
use super::wire::data_value_json;
use super::wire::json_array;
use super::wire::message_type_name;
use super::wire::timestamp_json;
use super::wire::variant_json;
use super::EncoderMetrics;
use super::EncoderMetricsSnapshot;
use super::EncoderSettings;
use super::MessageEncoder;
use crate::constants::CONTENT_ENCODING_UTF8;
use crate::constants::CONTENT_TYPE_JSON;
use crate::constants::MESSAGE_SCHEMA_NETWORK_MESSAGE_JSON;
use crate::DataSetContentMask;
use crate::DataSetFieldContentMask;
use crate::DataSetMessageModel;
use crate::DataValue;
use crate::MessageType;
use crate::NetworkMessageContentMask;
use crate::NetworkMessageModel;
use crate::Result;
use crate::SubscriptionNotificationModel;

/// Length of a default nanoid
const MESSAGE_ID_LEN: usize = 21;
/// `"Messages":` plus `[]` plus the closing `}` of the network message
const MESSAGES_FIELD_OVERHEAD: usize = 11 + 2 + 1;
const JSON_ARRAY_FRAME: usize = 2;

#[derive(Debug, Default)]
struct Sequences {
    network: u32,
    writers: HashMap<String, u32>,
}

/// Masks a data set message is serialized under
#[derive(Debug, Clone, Copy)]
struct DataSetMasks {
    content: DataSetContentMask,
    field: DataSetFieldContentMask,
}

struct EncodedDataSet {
    body: Vec<u8>,
    notification_count: usize,
    timestamp: DateTime<Utc>,
}

/// "Pub-sub" JSON encoder: notifications of a writer become data set
/// messages, which are wrapped (one or many) into network messages.
pub struct NetworkMessageEncoder {
    settings: EncoderSettings,
    metrics: EncoderMetrics,
    sequences: Mutex<Sequences>,
}

impl NetworkMessageEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            metrics: EncoderMetrics::default(),
            sequences: Mutex::new(Sequences::default()),
        }
    }

    fn has_network(
        &self,
        flag: NetworkMessageContentMask,
    ) -> bool {
        self.settings.network_message_content_mask.contains(flag)
    }

    fn next_writer_sequence(
        &self,
        writer: &str,
    ) -> u32 {
        let mut sequences = self.sequences.lock();
        let next = sequences.writers.entry(writer.to_string()).or_insert(0);
        *next = next.wrapping_add(1);
        *next
    }

    fn next_network_sequence(&self) -> u32 {
        let mut sequences = self.sequences.lock();
        sequences.network = sequences.network.wrapping_add(1);
        sequences.network
    }

    fn network_header(
        &self,
        message_id: &str,
        sequence_number: u32,
    ) -> Option<Map<String, Value>> {
        if !self.has_network(NetworkMessageContentMask::NETWORK_MESSAGE_HEADER) {
            return None;
        }
        let mut header = Map::new();
        header.insert("MessageId".to_string(), Value::from(message_id));
        header.insert("MessageType".to_string(), Value::from("ua-data"));
        if self.has_network(NetworkMessageContentMask::PUBLISHER_ID) {
            header.insert(
                "PublisherId".to_string(),
                Value::from(self.settings.publisher_id.as_str()),
            );
        }
        if self.has_network(NetworkMessageContentMask::WRITER_GROUP_ID) {
            header.insert(
                "WriterGroupId".to_string(),
                Value::from(self.settings.writer_group_id.as_str()),
            );
        }
        if self.has_network(NetworkMessageContentMask::SEQUENCE_NUMBER) {
            header.insert("SequenceNumber".to_string(), Value::from(sequence_number));
        }
        Some(header)
    }

    /// Bytes a network message adds around its data set messages. Sized
    /// for the widest message id and sequence number so it never
    /// underestimates.
    fn frame_size(&self) -> Result<usize> {
        let placeholder = "0".repeat(MESSAGE_ID_LEN);
        Ok(match self.network_header(&placeholder, u32::MAX) {
            None => JSON_ARRAY_FRAME,
            Some(header) => {
                let separator = usize::from(!header.is_empty());
                serde_json::to_vec(&Value::Object(header))?.len() + separator + MESSAGES_FIELD_OVERHEAD - 1
            }
        })
    }

    fn network_body(
        &self,
        header: Option<Map<String, Value>>,
        items: &[Vec<u8>],
    ) -> Result<Vec<u8>> {
        let Some(header) = header else {
            return Ok(json_array(items));
        };
        let separator = !header.is_empty();
        let mut body = serde_json::to_vec(&Value::Object(header))?;
        body.pop();
        if separator {
            body.push(b',');
        }
        body.extend_from_slice(b"\"Messages\":");
        body.extend_from_slice(&json_array(items));
        body.push(b'}');
        Ok(body)
    }

    fn data_set_json(
        &self,
        message: &DataSetMessageModel,
        masks: DataSetMasks,
    ) -> Result<Vec<u8>> {
        let compact = !self.settings.use_standards_compliant_encoding;
        let raw = masks.field.contains(DataSetFieldContentMask::RAW_DATA);
        let payload: Map<String, Value> = message
            .payload
            .iter()
            .map(|(name, value)| {
                let json = if raw {
                    variant_json(&value.value, compact)
                } else {
                    data_value_json(value, compact)
                };
                (name.clone(), json)
            })
            .collect();

        if !self.has_network(NetworkMessageContentMask::DATA_SET_MESSAGE_HEADER) {
            return Ok(serde_json::to_vec(&Value::Object(payload))?);
        }

        let has = |flag: DataSetContentMask| masks.content.contains(flag);
        let mut map = Map::new();
        if has(DataSetContentMask::DATA_SET_WRITER_ID) {
            map.insert(
                "DataSetWriterId".to_string(),
                Value::from(message.data_set_writer_name.as_str()),
            );
        }
        if has(DataSetContentMask::SEQUENCE_NUMBER) {
            map.insert("SequenceNumber".to_string(), Value::from(message.sequence_number));
        }
        if has(DataSetContentMask::MESSAGE_TYPE) {
            map.insert(
                "MessageType".to_string(),
                Value::from(message_type_name(message.message_type)),
            );
        }
        if has(DataSetContentMask::TIMESTAMP) {
            map.insert("Timestamp".to_string(), timestamp_json(&message.timestamp));
        }
        map.insert("Payload".to_string(), Value::Object(payload));
        Ok(serde_json::to_vec(&Value::Object(map))?)
    }

    /// Data set messages of all bundles in arrival order, each fitting
    /// `limit` once wrapped in a `frame` sized network message
    fn data_sets(
        &self,
        bundles: &[SubscriptionNotificationModel],
        frame: usize,
        limit: usize,
    ) -> Result<Vec<EncodedDataSet>> {
        let mut encoded = Vec::new();
        for bundle in bundles {
            let masks = match &bundle.context {
                Some(context) => DataSetMasks {
                    content: context.data_set_content_mask,
                    field: context.field_content_mask,
                },
                None => DataSetMasks {
                    content: DataSetContentMask::default(),
                    field: DataSetFieldContentMask::default(),
                },
            };
            let changes = collate(&bundle.notifications);
            if changes.is_empty() && bundle.message_type != MessageType::KeepAlive {
                continue;
            }

            let mut payload: BTreeMap<String, DataValue> = BTreeMap::new();
            let mut counts: BTreeMap<String, usize> = BTreeMap::new();
            for change in changes {
                let mut value = change.value.clone();
                if change.first.is_heartbeat
                    && !masks.content.contains(DataSetContentMask::TIMESTAMP)
                    && masks.field.contains(DataSetFieldContentMask::SOURCE_TIMESTAMP)
                {
                    value.source_timestamp = Some(bundle.timestamp);
                }
                let name = change.field_name().to_string();
                *counts.entry(name.clone()).or_insert(0) += change.count;
                payload.insert(name, apply_field_mask(&value, masks.field));
            }

            let writer = bundle.data_set_writer_name();
            let message = DataSetMessageModel {
                data_set_writer_name: writer.to_string(),
                publisher_id: self.settings.publisher_id.clone(),
                sequence_number: self.next_writer_sequence(writer),
                timestamp: bundle.timestamp,
                message_type: bundle.message_type,
                payload,
            };
            let body = self.data_set_json(&message, masks)?;
            if frame.saturating_add(body.len()) <= limit {
                encoded.push(EncodedDataSet {
                    body,
                    notification_count: counts.values().sum(),
                    timestamp: message.timestamp,
                });
                continue;
            }
            self.split(message, &counts, masks, frame, limit, &mut encoded)?;
        }
        Ok(encoded)
    }

    /// Spread the payload of an oversized data set message over several
    /// messages; fields too large on their own are dropped.
    fn split(
        &self,
        message: DataSetMessageModel,
        counts: &BTreeMap<String, usize>,
        masks: DataSetMasks,
        frame: usize,
        limit: usize,
        out: &mut Vec<EncodedDataSet>,
    ) -> Result<()> {
        let mut probe = DataSetMessageModel {
            sequence_number: u32::MAX,
            payload: BTreeMap::new(),
            ..message.clone()
        };
        let base = self.data_set_json(&probe, masks)?.len();

        let mut groups: Vec<BTreeMap<String, DataValue>> = Vec::new();
        let mut current: BTreeMap<String, DataValue> = BTreeMap::new();
        let mut size = base;
        for (name, value) in message.payload.iter() {
            probe.payload = BTreeMap::from([(name.clone(), value.clone())]);
            let entry = self.data_set_json(&probe, masks)?.len() - base;
            if frame.saturating_add(base + entry) > limit {
                warn!(
                    "[{}] dropping field {} of writer {}: {} bytes exceed limit {}",
                    self.settings.writer_group_id,
                    name,
                    message.data_set_writer_name,
                    entry,
                    limit
                );
                self.metrics.record_dropped(counts.get(name).copied().unwrap_or(1) as u64);
                continue;
            }
            let separator = usize::from(!current.is_empty());
            if frame + size + separator + entry > limit {
                groups.push(std::mem::take(&mut current));
                size = base + entry;
            } else {
                size += separator + entry;
            }
            current.insert(name.clone(), value.clone());
        }
        if !current.is_empty() {
            groups.push(current);
        }

        debug!(
            "[{}] split data set message of writer {} into {} parts",
            self.settings.writer_group_id,
            message.data_set_writer_name,
            groups.len()
        );
        for (i, payload) in groups.into_iter().enumerate() {
            let notification_count = payload.keys().map(|k| counts.get(k).copied().unwrap_or(1)).sum();
            let part = DataSetMessageModel {
                sequence_number: if i == 0 {
                    message.sequence_number
                } else {
                    self.next_writer_sequence(&message.data_set_writer_name)
                },
                payload,
                ..message.clone()
            };
            out.push(EncodedDataSet {
                body: self.data_set_json(&part, masks)?,
                notification_count,
                timestamp: part.timestamp,
            });
        }
        Ok(())
    }

    fn network_message(
        &self,
        data_sets: Vec<EncodedDataSet>,
    ) -> Result<NetworkMessageModel> {
        let message_id = nanoid!();
        let header = self.network_header(&message_id, self.next_network_sequence());
        let notification_count: usize = data_sets.iter().map(|d| d.notification_count).sum();
        let timestamp = data_sets.first().map(|d| d.timestamp).unwrap_or_else(Utc::now);
        let items: Vec<Vec<u8>> = data_sets.into_iter().map(|d| d.body).collect();
        let body = self.network_body(header, &items)?;

        self.metrics.record_processed(notification_count as u64);
        self.metrics.record_message(body.len(), notification_count);
        Ok(NetworkMessageModel {
            message_id,
            writer_group_id: self.settings.writer_group_id.clone(),
            body,
            content_type: CONTENT_TYPE_JSON.to_string(),
            content_encoding: Some(CONTENT_ENCODING_UTF8.to_string()),
            message_schema: MESSAGE_SCHEMA_NETWORK_MESSAGE_JSON.to_string(),
            routing_info: self
                .settings
                .enable_routing_info
                .then(|| self.settings.writer_group_id.clone()),
            timestamp,
            notification_count,
        })
    }
}

impl MessageEncoder for NetworkMessageEncoder {
    fn encode(
        &self,
        notifications: &[SubscriptionNotificationModel],
        max_message_size: usize,
    ) -> Result<Vec<NetworkMessageModel>> {
        let limit = body_limit(max_message_size);
        let frame = self.frame_size()?;
        let mut messages = Vec::new();
        for data_set in self.data_sets(notifications, frame, limit)? {
            messages.push(self.network_message(vec![data_set])?);
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
        let frame = self.frame_size()?;
        let data_sets = self.data_sets(notifications, frame, limit)?;
        let packed = pack(data_sets, |d| d.body.len(), frame, 1, limit);
        for data_set in &packed.oversized {
            self.metrics.record_dropped(data_set.notification_count as u64);
        }

        let mut messages = Vec::with_capacity(packed.chunks.len());
        for chunk in packed.chunks {
            messages.push(self.network_message(chunk)?);
        }
        self.metrics.record_split(notifications.len(), messages.len());
        debug!(
            "[{}] encoded {} bundles into {} network messages",
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
