use std::sync::Arc;
use std::time::Duration;

use iiot_publisher::InMemoryJobStore;
use iiot_publisher::JobDocumentStore;
use iiot_publisher::JobStatus;
use iiot_publisher::PublishStartRequestModel;
use iiot_publisher::PublishStopRequestModel;
use iiot_publisher::PublishedItemModel;
use iiot_publisher::PublisherConfig;
use iiot_publisher::PublisherConfigService;
use iiot_publisher::WriterGroupBuilder;
use iiot_publisher::WriterGroupHost;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::enable_logger;
use crate::common::eventually;
use crate::common::registry;
use crate::common::value_change;
use crate::common::RecordingTransport;
use crate::common::SimulatedDevice;

fn config() -> Arc<PublisherConfig> {
    let mut config = PublisherConfig::default();
    config.engine.batch_size = 50;
    config.engine.batch_trigger_interval_ms = 100;
    config.monitoring.prometheus_enabled = false;
    Arc::new(config)
}

fn start(
    node_id: &str,
    publishing_ms: u64,
) -> PublishStartRequestModel {
    PublishStartRequestModel {
        item: Some(PublishedItemModel::new(node_id).with_publishing_interval(Duration::from_millis(publishing_ms))),
        header: None,
    }
}

fn stop(node_id: &str) -> PublishStopRequestModel {
    PublishStopRequestModel {
        node_id: node_id.to_string(),
        header: None,
    }
}

/// # Case 1: publishing a node starts a writer group that delivers samples
/// # Case 2: stopping the last node cancels the job and stops the group
#[tokio::test]
async fn test_published_node_should_flow_to_transport_until_stopped() {
    enable_logger();
    let config = config();
    let device = SimulatedDevice::new();
    let transport = RecordingTransport::new(256 * 1024);
    let store = Arc::new(InMemoryJobStore::new());
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let service =
        PublisherConfigService::new(store.clone(), registry(&["E1"]), config.clone()).with_job_listener(jobs_tx);
    let host = Arc::new(WriterGroupHost::new(WriterGroupBuilder::new(
        config,
        device.clone(),
        transport.clone(),
    )));
    let ct = CancellationToken::new();
    let handle = tokio::spawn({
        let host = host.clone();
        let ct = ct.clone();
        async move { host.run(jobs_rx, ct).await }
    });

    service.node_publish_start("E1", start("ns=2;s=Temp", 1000)).await.unwrap();
    eventually(|| device.is_subscribed("E1_1000")).await;
    assert_eq!(host.group_ids(), vec!["E1".to_string()]);

    assert!(device.emit("E1_1000", vec![value_change("ns=2;s=Temp", 21.5)]).await);
    eventually(|| transport.sent_count() == 1).await;
    let body: serde_json::Value = serde_json::from_slice(&transport.messages()[0].body).unwrap();
    let sample = &body.as_array().unwrap()[0];
    assert_eq!(sample["NodeId"], "ns=2;s=Temp");
    assert_eq!(sample["DataSetWriterId"], "E1_1000");

    let result = service.node_publish_stop("E1", stop("ns=2;s=Temp")).await.unwrap();
    assert!(result.error_info.is_none());
    eventually(|| !device.is_subscribed("E1_1000")).await;
    eventually(|| host.group_ids().is_empty()).await;
    assert_eq!(store.get("E1").await.unwrap().unwrap().job.status(), JobStatus::Canceled);

    ct.cancel();
    handle.await.unwrap().unwrap();
}

/// Writers of different publishing intervals become separate subscriptions
/// of the same group
#[tokio::test]
async fn test_intervals_should_map_to_separate_subscriptions() {
    let config = config();
    let device = SimulatedDevice::new();
    let transport = RecordingTransport::new(256 * 1024);
    let store = Arc::new(InMemoryJobStore::new());
    let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
    let service =
        PublisherConfigService::new(store.clone(), registry(&["E1"]), config.clone()).with_job_listener(jobs_tx);
    let host = Arc::new(WriterGroupHost::new(WriterGroupBuilder::new(
        config,
        device.clone(),
        transport.clone(),
    )));
    let ct = CancellationToken::new();
    let handle = tokio::spawn({
        let host = host.clone();
        let ct = ct.clone();
        async move { host.run(jobs_rx, ct).await }
    });

    service.node_publish_start("E1", start("ns=2;s=Fast", 500)).await.unwrap();
    service.node_publish_start("E1", start("ns=2;s=Slow", 5000)).await.unwrap();
    eventually(|| device.is_subscribed("E1_500") && device.is_subscribed("E1_5000")).await;

    device.emit("E1_500", vec![value_change("ns=2;s=Fast", 1.0)]).await;
    device.emit("E1_5000", vec![value_change("ns=2;s=Slow", 2.0)]).await;
    eventually(|| {
        transport
            .messages()
            .iter()
            .map(|m| m.notification_count)
            .sum::<usize>()
            == 2
    })
    .await;

    ct.cancel();
    handle.await.unwrap().unwrap();
    assert!(!device.is_subscribed("E1_500"));
}

/// A restarted host picks the active jobs back up from the store
#[tokio::test]
async fn test_host_should_resume_jobs_from_store() {
    let config = config();
    let store = Arc::new(InMemoryJobStore::new());
    let service = PublisherConfigService::new(store.clone(), registry(&["E1", "E2"]), config.clone());
    service.node_publish_start("E1", start("ns=2;s=A", 1000)).await.unwrap();
    service.node_publish_start("E2", start("ns=2;s=B", 1000)).await.unwrap();
    service.node_publish_stop("E2", stop("ns=2;s=B")).await.unwrap();

    let device = SimulatedDevice::new();
    let host = WriterGroupHost::new(WriterGroupBuilder::new(
        config,
        device.clone(),
        RecordingTransport::new(256 * 1024),
    ));
    assert_eq!(host.load(store.as_ref()).await.unwrap(), 1);
    assert_eq!(host.group_ids(), vec!["E1".to_string()]);
    eventually(|| device.is_subscribed("E1_1000")).await;
    host.stop_all().await;
}
