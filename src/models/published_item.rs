use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::CredentialModel;

/// One node as seen by operators of the configuration service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedItemModel {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_set_writer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publishing_interval: Option<Duration>,
}

impl PublishedItemModel {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    pub fn with_publishing_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.publishing_interval = Some(interval);
        self
    }

    pub fn with_sampling_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.sampling_interval = Some(interval);
        self
    }

    pub fn with_heartbeat_interval(
        mut self,
        interval: Duration,
    ) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeaderModel {
    /// Credential the publisher uses towards the endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<CredentialModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceResultModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

pub const STATUS_BAD_NODE_ID_UNKNOWN: u32 = 0x8034_0000;

impl ServiceResultModel {
    pub fn good() -> Self {
        Self::default()
    }

    pub fn bad(
        status_code: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status_code: Some(status_code),
            error_message: Some(message.into()),
        }
    }

    pub fn is_good(&self) -> bool {
        self.status_code.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStartRequestModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<PublishedItemModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<RequestHeaderModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStartResultModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ServiceResultModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStopRequestModel {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<RequestHeaderModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStopResultModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<ServiceResultModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishBulkRequestModel {
    #[serde(default)]
    pub nodes_to_add: Vec<PublishedItemModel>,
    #[serde(default)]
    pub nodes_to_remove: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<RequestHeaderModel>,
}

/// Per-node outcome, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishBulkResultModel {
    #[serde(default)]
    pub nodes_to_add: Vec<ServiceResultModel>,
    #[serde(default)]
    pub nodes_to_remove: Vec<ServiceResultModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedItemListRequestModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedItemListResultModel {
    #[serde(default)]
    pub items: Vec<PublishedItemModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

/// Endpoint registration as resolved through the device registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRegistrationModel {
    pub id: String,
    pub endpoint: super::EndpointModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    /// Gateway (device) the endpoint was discovered through
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discoverer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,
}
