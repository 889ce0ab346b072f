use std::collections::BTreeSet;
use std::sync::Arc;

use iiot_publisher::BackoffPolicy;
use iiot_publisher::JobDocumentStore;
use iiot_publisher::PublishStartRequestModel;
use iiot_publisher::PublishStopRequestModel;
use iiot_publisher::PublishedItemListRequestModel;
use iiot_publisher::PublishedItemModel;
use iiot_publisher::PublisherConfig;
use iiot_publisher::PublisherConfigService;

use crate::common::enable_logger;
use crate::common::registry;
use crate::common::ContendedJobStore;

fn service(store: Arc<ContendedJobStore>) -> Arc<PublisherConfigService> {
    let mut config = PublisherConfig::default();
    config.retry.job_store = BackoffPolicy {
        max_retries: 100,
        timeout_ms: 5_000,
        base_delay_ms: 1,
        max_delay_ms: 20,
    };
    Arc::new(PublisherConfigService::new(store, registry(&["E1"]), Arc::new(config)))
}

fn start(node_id: &str) -> PublishStartRequestModel {
    PublishStartRequestModel {
        item: Some(PublishedItemModel::new(node_id)),
        header: None,
    }
}

async fn published(service: &PublisherConfigService) -> BTreeSet<String> {
    service
        .node_publish_list("E1", PublishedItemListRequestModel::default())
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|i| i.node_id)
        .collect()
}

/// # Case: concurrent adds against one endpoint, with foreign writes
/// interleaved, lose no node
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_should_not_lose_updates() {
    enable_logger();
    let store = ContendedJobStore::new(5);
    let service = service(store.clone());

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let service = service.clone();
            tokio::spawn(async move { service.node_publish_start("E1", start(&format!("ns=2;i={i}"))).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let expected: BTreeSet<String> = (0..20).map(|i| format!("ns=2;i={i}")).collect();
    assert_eq!(published(&service).await, expected);
    assert_eq!(store.conflicts_injected(), 5);
    // one write per add plus the injected foreign writes
    assert_eq!(store.get("E1").await.unwrap().unwrap().version, 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_and_removes_should_converge() {
    let store = ContendedJobStore::new(0);
    let service = service(store.clone());
    for i in 0..10 {
        service.node_publish_start("E1", start(&format!("ns=2;i={i}"))).await.unwrap();
    }

    let mut tasks = Vec::new();
    for i in 0..5 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            let result = service
                .node_publish_stop(
                    "E1",
                    PublishStopRequestModel {
                        node_id: format!("ns=2;i={i}"),
                        header: None,
                    },
                )
                .await
                .unwrap();
            assert!(result.error_info.is_none());
        }));
    }
    for i in 10..15 {
        let service = service.clone();
        tasks.push(tokio::spawn(async move {
            service.node_publish_start("E1", start(&format!("ns=2;i={i}"))).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let expected: BTreeSet<String> = (5..15).map(|i| format!("ns=2;i={i}")).collect();
    assert_eq!(published(&service).await, expected);
}
