use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use iiot_publisher::ConnectionModel;
use iiot_publisher::DataValue;
use iiot_publisher::EndpointModel;
use iiot_publisher::EndpointRegistrationModel;
use iiot_publisher::InMemoryJobStore;
use iiot_publisher::JobDocumentStore;
use iiot_publisher::JobInfoModel;
use iiot_publisher::MessageType;
use iiot_publisher::MonitoredItemNotificationModel;
use iiot_publisher::NetworkMessageModel;
use iiot_publisher::Result;
use iiot_publisher::StaticEndpointRegistry;
use iiot_publisher::SubscriptionClient;
use iiot_publisher::SubscriptionEvent;
use iiot_publisher::SubscriptionHandle;
use iiot_publisher::SubscriptionModel;
use iiot_publisher::Transport;
use iiot_publisher::VersionedJob;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

lazy_static! {
    static ref LOGGER_INIT: () = {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    };
}

pub fn enable_logger() {
    lazy_static::initialize(&LOGGER_INIT);
}

pub fn registry(endpoint_ids: &[&str]) -> Arc<StaticEndpointRegistry> {
    let registry = StaticEndpointRegistry::new();
    for id in endpoint_ids {
        registry.register(EndpointRegistrationModel {
            id: id.to_string(),
            endpoint: EndpointModel {
                url: format!("opc.tcp://{id}:4840"),
                ..Default::default()
            },
            site_id: Some("plant-a".to_string()),
            ..Default::default()
        });
    }
    Arc::new(registry)
}

pub fn value_change(
    node_id: &str,
    value: f64,
) -> MonitoredItemNotificationModel {
    MonitoredItemNotificationModel {
        id: node_id.to_string(),
        data_set_field_name: node_id.to_string(),
        node_id: node_id.to_string(),
        value: DataValue::new(value).with_source_timestamp(Utc::now()),
        ..Default::default()
    }
}

pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Field device simulator: one event channel per data set writer
#[derive(Default)]
pub struct SimulatedDevice {
    writers: Mutex<HashMap<String, (String, mpsc::Sender<SubscriptionEvent>)>>,
    next_id: AtomicUsize,
}

impl SimulatedDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_subscribed(
        &self,
        writer: &str,
    ) -> bool {
        self.writers.lock().contains_key(writer)
    }

    pub async fn emit(
        &self,
        writer: &str,
        notifications: Vec<MonitoredItemNotificationModel>,
    ) -> bool {
        let sender = self.writers.lock().get(writer).map(|(_, tx)| tx.clone());
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
}

#[async_trait]
impl SubscriptionClient for SimulatedDevice {
    async fn subscribe(
        &self,
        _connection: &ConnectionModel,
        subscription: SubscriptionModel,
    ) -> Result<SubscriptionHandle> {
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(64);
        self.writers
            .lock()
            .insert(subscription.data_set_writer_name.clone(), (id.clone(), tx));
        Ok(SubscriptionHandle {
            subscription_id: id,
            application_uri: Some("urn:simulated".to_string()),
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
        self.writers.lock().retain(|_, (id, _)| id != subscription_id);
        Ok(())
    }
}

pub struct RecordingTransport {
    max_message_size: usize,
    messages: Mutex<Vec<NetworkMessageModel>>,
}

impl RecordingTransport {
    pub fn new(max_message_size: usize) -> Arc<Self> {
        Arc::new(Self {
            max_message_size,
            messages: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<NetworkMessageModel> {
        self.messages.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.messages.lock().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    async fn send(
        &self,
        message: &NetworkMessageModel,
    ) -> Result<()> {
        self.messages.lock().push(message.clone());
        Ok(())
    }
}

/// Job store where another writer slips in before the first `conflicts`
/// conditional writes, and every call yields to let concurrent callers
/// interleave.
pub struct ContendedJobStore {
    inner: InMemoryJobStore,
    conflicts: AtomicUsize,
    conflicts_injected: AtomicUsize,
}

impl ContendedJobStore {
    pub fn new(conflicts: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryJobStore::new(),
            conflicts: AtomicUsize::new(conflicts),
            conflicts_injected: AtomicUsize::new(0),
        })
    }

    pub fn conflicts_injected(&self) -> usize {
        self.conflicts_injected.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl JobDocumentStore for ContendedJobStore {
    async fn get(
        &self,
        job_id: &str,
    ) -> Result<Option<VersionedJob>> {
        tokio::task::yield_now().await;
        self.inner.get(job_id).await
    }

    async fn put(
        &self,
        job_id: &str,
        job: &JobInfoModel,
        expected_version: Option<u64>,
    ) -> Result<u64> {
        tokio::task::yield_now().await;
        if expected_version.is_some() && self.take_conflict() {
            while let Some(current) = self.inner.get(job_id).await? {
                match self.inner.put(job_id, &current.job, Some(current.version)).await {
                    Ok(_) => {
                        self.conflicts_injected.fetch_add(1, Ordering::SeqCst);
                        break;
                    }
                    Err(e) if e.is_version_conflict() => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        self.inner.put(job_id, job, expected_version).await
    }

    async fn delete(
        &self,
        job_id: &str,
        expected_version: Option<u64>,
    ) -> Result<()> {
        self.inner.delete(job_id, expected_version).await
    }

    async fn list(&self) -> Result<Vec<VersionedJob>> {
        self.inner.list().await
    }
}
