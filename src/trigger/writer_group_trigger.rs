use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use super::MessageTrigger;
use super::NodeStats;
use super::SubscriptionClient;
use super::SubscriptionEvent;
use super::SubscriptionHandle;
use super::SubscriptionModel;
use super::TriggerCounters;
use super::TriggerCountersSnapshot;
use crate::constants::IN_FLIGHT_DRAIN_TIMEOUT;
use crate::utils::sleep_or_cancelled;
use crate::utils::ExponentialBackoff;
use crate::BackoffPolicy;
use crate::ConnectionModel;
use crate::DataSetWriterContext;
use crate::DataSetWriterModel;
use crate::NetworkError;
use crate::Result;
use crate::SubscriptionNotificationModel;

/// State shared between the trigger and its per-subscription pump tasks
struct TriggerShared {
    trigger_id: String,
    writer_group_id: String,
    connection: ConnectionModel,
    client: Arc<dyn SubscriptionClient>,
    policy: BackoffPolicy,
    tx: mpsc::Sender<SubscriptionNotificationModel>,
    counters: TriggerCounters,
}

struct ActiveSubscription {
    writer: DataSetWriterModel,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Trigger for all writers of a writer group that share one connection
pub struct WriterGroupMessageTrigger {
    shared: Arc<TriggerShared>,
    writers: ArcSwap<Vec<DataSetWriterModel>>,
    subscriptions: Mutex<HashMap<String, ActiveSubscription>>,
    ct: parking_lot::Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for WriterGroupMessageTrigger {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("WriterGroupMessageTrigger")
            .field("id", &self.shared.trigger_id)
            .field("writers", &self.writers.load().len())
            .finish()
    }
}

impl WriterGroupMessageTrigger {
    pub fn new(
        writer_group_id: &str,
        connection: ConnectionModel,
        writers: Vec<DataSetWriterModel>,
        client: Arc<dyn SubscriptionClient>,
        policy: BackoffPolicy,
        tx: mpsc::Sender<SubscriptionNotificationModel>,
    ) -> Self {
        let trigger_id = format!("{}:{}", writer_group_id, connection.connection_id());
        Self {
            shared: Arc::new(TriggerShared {
                trigger_id,
                writer_group_id: writer_group_id.to_string(),
                connection,
                client,
                policy,
                tx,
                counters: TriggerCounters::default(),
            }),
            writers: ArcSwap::from_pointee(writers),
            subscriptions: Mutex::new(HashMap::new()),
            ct: parking_lot::Mutex::new(None),
        }
    }

    pub fn connection(&self) -> &ConnectionModel {
        &self.shared.connection
    }

    /// Subscribe one writer and spawn the task pumping its events
    async fn open(
        &self,
        writer: &DataSetWriterModel,
        ct: &CancellationToken,
    ) -> Result<ActiveSubscription> {
        let request = self.shared.subscription_for(writer);
        let handle = self.shared.subscribe_once(&request).await?;

        let context = Arc::new(self.shared.context_for(writer));
        let cancel = ct.child_token();
        let task = tokio::spawn(run_subscription(
            self.shared.clone(),
            request,
            context,
            handle,
            cancel.clone(),
        ));
        Ok(ActiveSubscription {
            writer: writer.clone(),
            cancel,
            task,
        })
    }

    async fn close(
        &self,
        subscription: ActiveSubscription,
    ) {
        subscription.cancel.cancel();
        if let Err(e) = subscription.task.await {
            warn!("[{}] subscription task failed: {:?}", self.shared.trigger_id, e);
        }
    }
}

#[async_trait]
impl MessageTrigger for WriterGroupMessageTrigger {
    fn id(&self) -> String {
        self.shared.trigger_id.clone()
    }

    fn writers(&self) -> Arc<Vec<DataSetWriterModel>> {
        self.writers.load_full()
    }

    #[instrument(skip_all, fields(trigger = %self.shared.trigger_id))]
    async fn start(
        &self,
        ct: CancellationToken,
    ) -> Result<()> {
        let ct = ct.child_token();
        // held for the whole start so a concurrent reconfigure waits for it
        let mut subscriptions = self.subscriptions.lock().await;
        let writers = self.writers.load_full();

        let mut opened = HashMap::new();
        for writer in writers.iter() {
            match self.open(writer, &ct).await {
                Ok(subscription) => {
                    opened.insert(writer.data_set_writer_name.clone(), subscription);
                }
                Err(e) => {
                    warn!("initial subscription for {} failed: {:?}", writer.data_set_writer_name, e);
                    for (_, subscription) in opened.drain() {
                        self.close(subscription).await;
                    }
                    return Err(e);
                }
            }
        }

        for (_, previous) in subscriptions.drain() {
            self.close(previous).await;
        }
        *subscriptions = opened;
        *self.ct.lock() = Some(ct);
        self.shared.counters.set_connection_ok(true);
        info!("started {} subscriptions", subscriptions.len());
        Ok(())
    }

    #[instrument(skip_all, fields(trigger = %self.shared.trigger_id))]
    async fn reconfigure(
        &self,
        writers: Vec<DataSetWriterModel>,
    ) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        self.writers.store(Arc::new(writers.clone()));
        let ct = match self.ct.lock().clone() {
            Some(ct) => ct,
            // Not started yet; the new writers are picked up by start
            None => return Ok(()),
        };

        let wanted: HashMap<&str, &DataSetWriterModel> = writers
            .iter()
            .map(|w| (w.data_set_writer_name.as_str(), w))
            .collect();

        let stale: Vec<String> = subscriptions
            .iter()
            .filter(|(name, s)| wanted.get(name.as_str()).map_or(true, |w| **w != s.writer))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            if let Some(subscription) = subscriptions.remove(&name) {
                debug!("closing subscription of writer {}", name);
                self.close(subscription).await;
            }
        }

        for (name, writer) in wanted {
            if subscriptions.contains_key(name) {
                continue;
            }
            let subscription = self.open(writer, &ct).await?;
            subscriptions.insert(name.to_string(), subscription);
        }
        info!("reconfigured to {} subscriptions", subscriptions.len());
        Ok(())
    }

    async fn stop(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(ct) = self.ct.lock().take() {
            ct.cancel();
        }
        for (_, subscription) in subscriptions.drain() {
            self.close(subscription).await;
        }
        self.shared.counters.set_connection_ok(false);
        info!("[{}] stopped", self.shared.trigger_id);
    }

    fn counters(&self) -> TriggerCountersSnapshot {
        self.shared.counters.snapshot()
    }

    fn reset_counters(&self) {
        self.shared.counters.reset_last_minute();
    }
}

impl TriggerShared {
    fn subscription_for(
        &self,
        writer: &DataSetWriterModel,
    ) -> SubscriptionModel {
        SubscriptionModel {
            id: format!("{}:{}", self.writer_group_id, writer.data_set_writer_name),
            data_set_writer_name: writer.data_set_writer_name.clone(),
            publishing_interval: writer.publishing_interval(),
            monitored_items: writer.variables().to_vec(),
        }
    }

    fn context_for(
        &self,
        writer: &DataSetWriterModel,
    ) -> DataSetWriterContext {
        DataSetWriterContext {
            writer_group_id: self.writer_group_id.clone(),
            data_set_writer_name: writer.data_set_writer_name.clone(),
            data_set_content_mask: writer.message_settings.data_set_message_content_mask,
            field_content_mask: writer.data_set_field_content_mask,
            extension_fields: writer.data_set.extension_fields.clone(),
            publishing_interval: writer.publishing_interval(),
        }
    }

    async fn subscribe_once(
        &self,
        request: &SubscriptionModel,
    ) -> Result<SubscriptionHandle> {
        let op_timeout = Duration::from_millis(self.policy.timeout_ms);
        let handle = match timeout(op_timeout, self.client.subscribe(&self.connection, request.clone())).await {
            Ok(result) => result?,
            Err(_) => return Err(NetworkError::Timeout(op_timeout).into()),
        };
        self.counters.set_node_stats(
            &request.data_set_writer_name,
            NodeStats {
                good: handle.good_nodes,
                bad: handle.bad_nodes,
            },
        );
        debug!(
            "[{}] subscription {} created ({} good / {} bad nodes)",
            self.trigger_id, handle.subscription_id, handle.good_nodes, handle.bad_nodes
        );
        Ok(handle)
    }

    /// Retry until subscribed again. Only cancellation ends the loop.
    async fn resubscribe(
        &self,
        request: &SubscriptionModel,
        ct: &CancellationToken,
    ) -> Option<SubscriptionHandle> {
        let mut backoff = ExponentialBackoff::new(&self.policy);
        loop {
            let delay = backoff.next_delay();
            if !sleep_or_cancelled(delay, ct).await {
                return None;
            }
            self.counters.record_retry();
            match self.subscribe_once(request).await {
                Ok(handle) => {
                    info!(
                        "[{}] re-subscribed {} after {} attempts",
                        self.trigger_id,
                        request.data_set_writer_name,
                        backoff.attempts()
                    );
                    return Some(handle);
                }
                Err(e) => {
                    warn!(
                        "[{}] re-subscribe of {} failed (attempt {}): {:?}",
                        self.trigger_id,
                        request.data_set_writer_name,
                        backoff.attempts(),
                        e
                    );
                }
            }
        }
    }
}

async fn run_subscription(
    shared: Arc<TriggerShared>,
    request: SubscriptionModel,
    context: Arc<DataSetWriterContext>,
    mut handle: SubscriptionHandle,
    ct: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = ct.cancelled() => break,
            event = handle.events.recv() => event,
        };

        let reason = match event {
            Some(SubscriptionEvent::Notification {
                message_type,
                sequence_number,
                timestamp,
                notifications,
            }) => {
                shared.counters.set_connection_ok(true);
                shared.counters.record(message_type, &notifications);
                let notification = SubscriptionNotificationModel {
                    subscription_id: handle.subscription_id.clone(),
                    connection_id: shared.connection.connection_id(),
                    endpoint_url: shared.connection.endpoint.url.clone(),
                    application_uri: handle.application_uri.clone(),
                    message_type,
                    sequence_number,
                    timestamp,
                    notifications,
                    context: Some(context.clone()),
                };
                let send = shared.tx.send(notification);
                tokio::pin!(send);
                let stopping = tokio::select! {
                    biased;
                    sent = &mut send => {
                        if sent.is_err() {
                            debug!("[{}] notification receiver closed", shared.trigger_id);
                            break;
                        }
                        false
                    }
                    _ = ct.cancelled() => true,
                };
                if !stopping {
                    continue;
                }
                // hand over the notification already taken off the subscription
                match timeout(IN_FLIGHT_DRAIN_TIMEOUT, send).await {
                    Ok(Ok(())) => debug!("[{}] in-flight notification delivered on stop", shared.trigger_id),
                    Ok(Err(_)) => debug!("[{}] notification receiver closed", shared.trigger_id),
                    Err(_) => warn!(
                        "[{}] dropped in-flight notification, receiver did not drain within {:?}",
                        shared.trigger_id, IN_FLIGHT_DRAIN_TIMEOUT
                    ),
                }
                break;
            }
            Some(SubscriptionEvent::ConnectionLost(reason)) => reason,
            None => "event stream closed".to_string(),
        };

        warn!(
            "[{}] subscription {} lost: {}",
            shared.trigger_id, handle.subscription_id, reason
        );
        shared.counters.set_connection_ok(false);
        match shared.resubscribe(&request, &ct).await {
            Some(new_handle) => handle = new_handle,
            None => break,
        }
    }

    if let Err(e) = shared
        .client
        .unsubscribe(&shared.connection, &handle.subscription_id)
        .await
    {
        warn!(
            "[{}] unsubscribe {} failed: {:?}",
            shared.trigger_id, handle.subscription_id, e
        );
    }
    shared.counters.remove_node_stats(&request.data_set_writer_name);
}
