use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::MessagingMode;
use super::WriterGroupModel;
use crate::PublishError;
use crate::Result;
use crate::StorageError;

/// Type tag of the only job configuration the publisher understands
pub const WRITER_GROUP_JOB_TYPE: &str = "WriterGroupJobV2";

/// Per-job engine overrides; unset values fall back to `EngineConfig`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfigurationModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_trigger_interval: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_outgress_messages: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics_interval: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterGroupJobModel {
    pub writer_group: WriterGroupModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineConfigurationModel>,
    #[serde(default)]
    pub messaging_mode: MessagingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum JobConfiguration {
    #[serde(rename = "WriterGroupJobV2")]
    WriterGroup(WriterGroupJobModel),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    #[default]
    Active,
    Canceled,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemandOperator {
    Equals,
    Match,
    Exists,
}

/// Requirement an agent must satisfy to run the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandModel {
    pub key: String,
    pub operator: DemandOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl DemandModel {
    pub fn equals(
        key: &str,
        value: &str,
    ) -> Self {
        Self {
            key: key.to_string(),
            operator: DemandOperator::Equals,
            value: Some(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyConfigModel {
    pub desired_active_agents: u32,
    pub desired_passive_agents: u32,
}

impl Default for RedundancyConfigModel {
    fn default() -> Self {
        Self {
            desired_active_agents: 1,
            desired_passive_agents: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLifetimeDataModel {
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl JobLifetimeDataModel {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Active,
            created: now,
            updated: now,
        }
    }
}

/// Persisted job document. The version is owned by the store, not the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfoModel {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub configuration: JobConfiguration,
    #[serde(default)]
    pub demands: Vec<DemandModel>,
    #[serde(default)]
    pub redundancy_config: RedundancyConfigModel,
    pub lifetime_data: JobLifetimeDataModel,
}

impl JobInfoModel {
    pub fn writer_group_job(&self) -> &WriterGroupJobModel {
        match &self.configuration {
            JobConfiguration::WriterGroup(job) => job,
        }
    }

    pub fn writer_group_job_mut(&mut self) -> &mut WriterGroupJobModel {
        match &mut self.configuration {
            JobConfiguration::WriterGroup(job) => job,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.lifetime_data.status
    }

    pub fn is_active(&self) -> bool {
        self.lifetime_data.status == JobStatus::Active
    }

    pub fn to_document(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored document.
    ///
    /// An unknown configuration type is rejected as unsupported before the
    /// body is interpreted; a malformed body is reported as corruption.
    pub fn from_document(
        job_id: &str,
        document: &str,
    ) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(document).map_err(|e| StorageError::CorruptedDocument {
                job_id: job_id.to_string(),
                reason: e.to_string(),
            })?;

        let job_type = value
            .pointer("/configuration/type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StorageError::CorruptedDocument {
                job_id: job_id.to_string(),
                reason: "missing configuration type".to_string(),
            })?;
        if job_type != WRITER_GROUP_JOB_TYPE {
            return Err(PublishError::UnsupportedJobType(job_type.to_string()).into());
        }

        serde_json::from_value(value).map_err(|e| {
            StorageError::CorruptedDocument {
                job_id: job_id.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}
