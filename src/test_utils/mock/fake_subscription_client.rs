use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::ConnectionModel;
use crate::MessageType;
use crate::MonitoredItemNotificationModel;
use crate::NetworkError;
use crate::Result;
use crate::SubscriptionClient;
use crate::SubscriptionEvent;
use crate::SubscriptionHandle;
use crate::SubscriptionModel;

#[derive(Default)]
struct FakeState {
    // keyed by data set writer name
    senders: HashMap<String, (String, mpsc::Sender<SubscriptionEvent>)>,
    subscribe_calls: Vec<SubscriptionModel>,
    unsubscribed: Vec<String>,
    fail_next: usize,
    subscribe_delay: Duration,
    next_id: u64,
}

/// In-process field device: every subscription gets a channel the test can
/// push notifications or connection losses into.
#[derive(Default)]
pub struct FakeSubscriptionClient {
    state: Mutex<FakeState>,
}

impl FakeSubscriptionClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_subscribes(
        &self,
        n: usize,
    ) {
        self.state.lock().fail_next = n;
    }

    /// Every later subscribe takes this long before the device answers
    pub fn set_subscribe_delay(
        &self,
        delay: Duration,
    ) {
        self.state.lock().subscribe_delay = delay;
    }

    pub fn subscribe_calls(&self) -> Vec<SubscriptionModel> {
        self.state.lock().subscribe_calls.clone()
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.state.lock().unsubscribed.clone()
    }

    pub fn is_subscribed(
        &self,
        writer: &str,
    ) -> bool {
        self.state.lock().senders.contains_key(writer)
    }

    /// Emit value changes on the subscription of `writer`
    pub async fn emit(
        &self,
        writer: &str,
        notifications: Vec<MonitoredItemNotificationModel>,
    ) -> bool {
        let sender = self.state.lock().senders.get(writer).map(|(_, tx)| tx.clone());
        match sender {
            Some(tx) => tx
                .send(SubscriptionEvent::Notification {
                    message_type: MessageType::DeltaFrame,
                    sequence_number: 1,
                    timestamp: Utc::now(),
                    notifications,
                })
                .await
                .is_ok(),
            None => false,
        }
    }

    pub async fn drop_connection(
        &self,
        writer: &str,
    ) {
        let sender = self.state.lock().senders.remove(writer);
        if let Some((_, tx)) = sender {
            let _ = tx.send(SubscriptionEvent::ConnectionLost("session closed".to_string())).await;
        }
    }
}

#[async_trait]
impl SubscriptionClient for FakeSubscriptionClient {
    async fn subscribe(
        &self,
        _connection: &ConnectionModel,
        subscription: SubscriptionModel,
    ) -> Result<SubscriptionHandle> {
        let delay = self.state.lock().subscribe_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.subscribe_calls.push(subscription.clone());
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(NetworkError::SubscriptionFailed {
                endpoint_url: "fake".to_string(),
                subscription_id: subscription.id,
                reason: "device unreachable".to_string(),
            }
            .into());
        }
        state.next_id += 1;
        let subscription_id = format!("sub-{}", state.next_id);
        let (tx, rx) = mpsc::channel(64);
        state
            .senders
            .insert(subscription.data_set_writer_name.clone(), (subscription_id.clone(), tx));
        Ok(SubscriptionHandle {
            subscription_id,
            application_uri: Some("urn:fake".to_string()),
            good_nodes: subscription.monitored_items.len() as u64,
            bad_nodes: 0,
            events: rx,
        })
    }

    async fn unsubscribe(
        &self,
        _connection: &ConnectionModel,
        subscription_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.unsubscribed.push(subscription_id.to_string());
        state.senders.retain(|_, (id, _)| id != subscription_id);
        Ok(())
    }
}
