use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::ConnectionModel;
use super::DataSetContentMask;
use super::DataSetFieldContentMask;
use super::NetworkMessageContentMask;

/// Wire encoding of published network messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageEncoding {
    #[default]
    Json,
    Binary,
}

/// Message shape: flat monitored item samples or pub-sub network messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessagingMode {
    #[default]
    Samples,
    PubSub,
}

impl MessagingMode {
    pub fn supports(
        self,
        encoding: MessageEncoding,
    ) -> bool {
        match self {
            MessagingMode::Samples => true,
            MessagingMode::PubSub => encoding == MessageEncoding::Json,
        }
    }
}

/// One node to sample on the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDataSetVariableModel {
    pub id: String,
    pub published_variable_node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_variable_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSettingsModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishing_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_keep_alive_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDataSetSourceModel {
    pub connection: ConnectionModel,
    #[serde(default)]
    pub published_variables: Vec<PublishedDataSetVariableModel>,
    #[serde(default)]
    pub subscription_settings: SubscriptionSettingsModel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetMetaDataModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_set_class_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedDataSetModel {
    pub data_set_source: PublishedDataSetSourceModel,
    #[serde(default)]
    pub data_set_meta_data: DataSetMetaDataModel,
    /// Static key/value pairs appended to every message of the writer
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extension_fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetWriterMessageSettingsModel {
    #[serde(default)]
    pub data_set_message_content_mask: DataSetContentMask,
}

/// Binds one published data set to the writer group. The writer name is
/// unique within the group and keys the writer for add/remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetWriterModel {
    pub data_set_writer_name: String,
    pub data_set: PublishedDataSetModel,
    #[serde(default)]
    pub data_set_field_content_mask: DataSetFieldContentMask,
    #[serde(default)]
    pub message_settings: DataSetWriterMessageSettingsModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_frame_count: Option<u32>,
}

impl DataSetWriterModel {
    pub fn connection(&self) -> &ConnectionModel {
        &self.data_set.data_set_source.connection
    }

    pub fn variables(&self) -> &[PublishedDataSetVariableModel] {
        &self.data_set.data_set_source.published_variables
    }

    pub fn publishing_interval(&self) -> Option<Duration> {
        self.data_set.data_set_source.subscription_settings.publishing_interval
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterGroupMessageSettingsModel {
    #[serde(default)]
    pub network_message_content_mask: NetworkMessageContentMask,
}

/// Set of data set writers sharing one engine, encoder and sink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterGroupModel {
    pub writer_group_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub data_set_writers: Vec<DataSetWriterModel>,
    #[serde(default)]
    pub message_type: MessageEncoding,
    #[serde(default)]
    pub message_settings: WriterGroupMessageSettingsModel,
}

impl WriterGroupModel {
    pub fn writer(
        &self,
        name: &str,
    ) -> Option<&DataSetWriterModel> {
        self.data_set_writers.iter().find(|w| w.data_set_writer_name == name)
    }

    pub fn variable_count(&self) -> usize {
        self.data_set_writers.iter().map(|w| w.variables().len()).sum()
    }
}
