use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::MessageSource;
use crate::utils::sleep_or_cancelled;
use crate::utils::ExponentialBackoff;
use crate::BackoffPolicy;
use crate::ConnectionModel;
use crate::DataSetWriterModel;
use crate::MessageTrigger;
use crate::Result;
use crate::SubscriptionClient;
use crate::SubscriptionNotificationModel;
use crate::TriggerCountersSnapshot;
use crate::WriterGroupJobModel;
use crate::WriterGroupMessageTrigger;

/// Creates the trigger for one connection of a writer group; every trigger
/// feeds the given sender
pub type TriggerFactory = Arc<
    dyn Fn(
            ConnectionModel,
            Vec<DataSetWriterModel>,
            mpsc::Sender<SubscriptionNotificationModel>,
        ) -> Arc<dyn MessageTrigger>
        + Send
        + Sync,
>;

struct SupervisedTrigger {
    trigger: Arc<dyn MessageTrigger>,
    cancel: CancellationToken,
    supervisor: Option<JoinHandle<()>>,
}

/// Source with one trigger per distinct connection of the writer group
pub struct WriterGroupMessageSource {
    writer_group_id: String,
    factory: TriggerFactory,
    policy: BackoffPolicy,
    counter_reset_interval: Duration,
    tx: mpsc::Sender<SubscriptionNotificationModel>,
    triggers: Arc<RwLock<HashMap<ConnectionModel, SupervisedTrigger>>>,
    counter_reset_tx: Arc<watch::Sender<u64>>,
    ct: Mutex<Option<CancellationToken>>,
    counter_reset_task: Mutex<Option<JoinHandle<()>>>,
    // serializes start/update/stop
    lifecycle: tokio::sync::Mutex<()>,
}

impl WriterGroupMessageSource {
    /// Build the (not yet started) source and the receiving end of its stream
    pub fn new(
        job: &WriterGroupJobModel,
        client: Arc<dyn SubscriptionClient>,
        policy: BackoffPolicy,
        counter_reset_interval: Duration,
        channel_capacity: usize,
    ) -> (Self, mpsc::Receiver<SubscriptionNotificationModel>) {
        let writer_group_id = job.writer_group.writer_group_id.clone();
        let factory: TriggerFactory = Arc::new(
            move |connection: ConnectionModel,
                  writers: Vec<DataSetWriterModel>,
                  tx: mpsc::Sender<SubscriptionNotificationModel>|
                  -> Arc<dyn MessageTrigger> {
                Arc::new(WriterGroupMessageTrigger::new(
                    &writer_group_id,
                    connection,
                    writers,
                    client.clone(),
                    policy,
                    tx,
                ))
            },
        );
        Self::with_trigger_factory(job, factory, policy, counter_reset_interval, channel_capacity)
    }

    /// Same as `new`, with triggers created by `factory`
    pub fn with_trigger_factory(
        job: &WriterGroupJobModel,
        factory: TriggerFactory,
        policy: BackoffPolicy,
        counter_reset_interval: Duration,
        channel_capacity: usize,
    ) -> (Self, mpsc::Receiver<SubscriptionNotificationModel>) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let (counter_reset_tx, _) = watch::channel(0);
        let source = Self {
            writer_group_id: job.writer_group.writer_group_id.clone(),
            factory,
            policy,
            counter_reset_interval,
            tx,
            triggers: Arc::new(RwLock::new(HashMap::new())),
            counter_reset_tx: Arc::new(counter_reset_tx),
            ct: Mutex::new(None),
            counter_reset_task: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        };
        for (connection, writers) in writers_by_connection(job) {
            source.add_trigger(connection, writers, None);
        }
        (source, rx)
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.read().len()
    }

    fn add_trigger(
        &self,
        connection: ConnectionModel,
        writers: Vec<DataSetWriterModel>,
        ct: Option<&CancellationToken>,
    ) {
        let trigger = (self.factory)(connection.clone(), writers, self.tx.clone());
        let cancel = ct.map(|ct| ct.child_token()).unwrap_or_default();
        let supervisor = ct.map(|_| tokio::spawn(supervise(trigger.clone(), self.policy, cancel.clone())));
        self.triggers.write().insert(
            connection,
            SupervisedTrigger {
                trigger,
                cancel,
                supervisor,
            },
        );
    }

    async fn shutdown(supervised: SupervisedTrigger) {
        supervised.cancel.cancel();
        if let Some(supervisor) = supervised.supervisor {
            if let Err(e) = supervisor.await {
                warn!("trigger supervisor failed: {:?}", e);
            }
        }
        supervised.trigger.stop().await;
    }
}

#[async_trait]
impl MessageSource for WriterGroupMessageSource {
    async fn start(
        &self,
        ct: CancellationToken,
    ) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let ct = ct.child_token();
        {
            let mut triggers = self.triggers.write();
            for supervised in triggers.values_mut() {
                if supervised.supervisor.is_none() {
                    supervised.cancel = ct.child_token();
                    supervised.supervisor = Some(tokio::spawn(supervise(
                        supervised.trigger.clone(),
                        self.policy,
                        supervised.cancel.clone(),
                    )));
                }
            }
        }

        let task = tokio::spawn(reset_counters_periodically(
            self.triggers.clone(),
            self.counter_reset_tx.clone(),
            self.counter_reset_interval,
            ct.clone(),
        ));
        if let Some(previous) = self.counter_reset_task.lock().replace(task) {
            previous.abort();
        }
        *self.ct.lock() = Some(ct);
        info!("[{}] source started with {} triggers", self.writer_group_id, self.trigger_count());
        Ok(())
    }

    async fn update(
        &self,
        job: &WriterGroupJobModel,
    ) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        let ct = self.ct.lock().clone();
        let desired = writers_by_connection(job);

        let removed: Vec<SupervisedTrigger> = {
            let mut triggers = self.triggers.write();
            let gone: Vec<ConnectionModel> = triggers
                .keys()
                .filter(|c| !desired.contains_key(*c))
                .cloned()
                .collect();
            gone.iter().filter_map(|c| triggers.remove(c)).collect()
        };
        for supervised in removed {
            debug!("[{}] removing trigger {}", self.writer_group_id, supervised.trigger.id());
            Self::shutdown(supervised).await;
        }

        for (connection, writers) in desired {
            let existing = self.triggers.read().get(&connection).map(|s| s.trigger.clone());
            match existing {
                Some(trigger) => {
                    if *trigger.writers() == writers {
                        continue;
                    }
                    if let Err(e) = trigger.reconfigure(writers.clone()).await {
                        warn!(
                            "[{}] reconfigure of {} failed, recreating: {:?}",
                            self.writer_group_id,
                            trigger.id(),
                            e
                        );
                        let stale = self.triggers.write().remove(&connection);
                        if let Some(stale) = stale {
                            Self::shutdown(stale).await;
                        }
                        self.add_trigger(connection, writers, ct.as_ref());
                    }
                }
                None => self.add_trigger(connection, writers, ct.as_ref()),
            }
        }
        info!("[{}] source updated to {} triggers", self.writer_group_id, self.trigger_count());
        Ok(())
    }

    async fn stop(&self) {
        let _guard = self.lifecycle.lock().await;
        if let Some(ct) = self.ct.lock().take() {
            ct.cancel();
        }
        if let Some(task) = self.counter_reset_task.lock().take() {
            task.abort();
        }
        let all: Vec<SupervisedTrigger> = self.triggers.write().drain().map(|(_, s)| s).collect();
        for supervised in all {
            Self::shutdown(supervised).await;
        }
        info!("[{}] source stopped", self.writer_group_id);
    }

    fn counter_reset(&self) -> watch::Receiver<u64> {
        self.counter_reset_tx.subscribe()
    }

    fn counters(&self) -> Vec<(String, TriggerCountersSnapshot)> {
        self.triggers
            .read()
            .values()
            .map(|s| (s.trigger.id(), s.trigger.counters()))
            .collect()
    }
}

/// Writers grouped by the connection they subscribe through, in job order
fn writers_by_connection(job: &WriterGroupJobModel) -> HashMap<ConnectionModel, Vec<DataSetWriterModel>> {
    let mut grouped: HashMap<ConnectionModel, Vec<DataSetWriterModel>> = HashMap::new();
    for writer in &job.writer_group.data_set_writers {
        grouped
            .entry(writer.connection().clone())
            .or_default()
            .push(writer.clone());
    }
    grouped
}

/// Keep starting the trigger until it succeeds or the source is stopped
async fn supervise(
    trigger: Arc<dyn MessageTrigger>,
    policy: BackoffPolicy,
    ct: CancellationToken,
) {
    let mut backoff = ExponentialBackoff::new(&policy);
    loop {
        match trigger.start(ct.clone()).await {
            Ok(()) => return,
            Err(e) => {
                let delay = backoff.next_delay();
                warn!(
                    "trigger {} failed to start (attempt {}), retrying in {:?}: {:?}",
                    trigger.id(),
                    backoff.attempts(),
                    delay,
                    e
                );
                if !sleep_or_cancelled(delay, &ct).await {
                    return;
                }
            }
        }
    }
}

async fn reset_counters_periodically(
    triggers: Arc<RwLock<HashMap<ConnectionModel, SupervisedTrigger>>>,
    counter_reset_tx: Arc<watch::Sender<u64>>,
    period: Duration,
    ct: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            _ = ct.cancelled() => return,
            _ = ticker.tick() => {
                let current: Vec<Arc<dyn MessageTrigger>> =
                    triggers.read().values().map(|s| s.trigger.clone()).collect();
                for trigger in current {
                    trigger.reset_counters();
                }
                counter_reset_tx.send_modify(|epoch| *epoch += 1);
            }
        }
    }
}
