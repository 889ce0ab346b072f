use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::DataSetContentMask;
use super::DataSetFieldContentMask;
use super::DataValue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    KeyFrame,
    #[default]
    DeltaFrame,
    Event,
    KeepAlive,
}

/// Writer settings captured when a trigger emits a notification, so the
/// encoder serializes each bundle with the settings it was produced under.
#[derive(Debug, Clone, Default)]
pub struct DataSetWriterContext {
    pub writer_group_id: String,
    pub data_set_writer_name: String,
    pub data_set_content_mask: DataSetContentMask,
    pub field_content_mask: DataSetFieldContentMask,
    pub extension_fields: BTreeMap<String, String>,
    pub publishing_interval: Option<Duration>,
}

/// One value or event field change of a monitored item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitoredItemNotificationModel {
    /// Monitored item id; event fields of one event share it
    pub id: String,
    /// Set for event fields, groups the fields of one event occurrence
    pub message_id: Option<u32>,
    pub data_set_field_name: String,
    pub node_id: String,
    pub display_name: Option<String>,
    pub value: DataValue,
    pub sequence_number: Option<u32>,
    pub is_heartbeat: bool,
}

/// Bundle of changes one trigger emitted at one point in time
#[derive(Debug, Clone, Default)]
pub struct SubscriptionNotificationModel {
    pub subscription_id: String,
    pub connection_id: String,
    pub endpoint_url: String,
    pub application_uri: Option<String>,
    pub message_type: MessageType,
    pub sequence_number: u32,
    pub timestamp: DateTime<Utc>,
    pub notifications: Vec<MonitoredItemNotificationModel>,
    pub context: Option<Arc<DataSetWriterContext>>,
}

impl SubscriptionNotificationModel {
    pub fn data_set_writer_name(&self) -> &str {
        self.context
            .as_ref()
            .map(|c| c.data_set_writer_name.as_str())
            .unwrap_or(&self.subscription_id)
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Notifications of one writer grouped into a key/value payload
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetMessageModel {
    pub data_set_writer_name: String,
    pub publisher_id: String,
    pub sequence_number: u32,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    pub payload: BTreeMap<String, DataValue>,
}

/// Final wire unit handed to the sink
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessageModel {
    pub message_id: String,
    pub writer_group_id: String,
    pub body: Vec<u8>,
    pub content_type: String,
    pub content_encoding: Option<String>,
    pub message_schema: String,
    pub routing_info: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Notifications carried by this message
    pub notification_count: usize,
}

impl NetworkMessageModel {
    pub fn encoded_size(&self) -> usize {
        self.body.len()
    }
}
