use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;

use crate::ConnectionModel;
use crate::MessageType;
use crate::MonitoredItemNotificationModel;
use crate::PublishedDataSetVariableModel;
use crate::Result;

/// What to monitor for one data set writer
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionModel {
    pub id: String,
    pub data_set_writer_name: String,
    pub publishing_interval: Option<Duration>,
    pub monitored_items: Vec<PublishedDataSetVariableModel>,
}

#[derive(Debug)]
pub enum SubscriptionEvent {
    Notification {
        message_type: MessageType,
        sequence_number: u32,
        timestamp: DateTime<Utc>,
        notifications: Vec<MonitoredItemNotificationModel>,
    },
    /// Session dropped; the event channel yields nothing further
    ConnectionLost(String),
}

/// Live subscription as handed out by the field device stack
#[derive(Debug)]
pub struct SubscriptionHandle {
    pub subscription_id: String,
    pub application_uri: Option<String>,
    /// Monitored items the server accepted
    pub good_nodes: u64,
    /// Monitored items the server rejected
    pub bad_nodes: u64,
    pub events: mpsc::Receiver<SubscriptionEvent>,
}

/// Opaque "subscribe and get notifications" capability of the field device
/// protocol stack.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubscriptionClient: Send + Sync + 'static {
    async fn subscribe(
        &self,
        connection: &ConnectionModel,
        subscription: SubscriptionModel,
    ) -> Result<SubscriptionHandle>;

    async fn unsubscribe(
        &self,
        connection: &ConnectionModel,
        subscription_id: &str,
    ) -> Result<()>;
}
