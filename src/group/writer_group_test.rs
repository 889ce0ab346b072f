use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;

use super::*;
use crate::test_utils::enable_logger;
use crate::test_utils::value_change;
use crate::test_utils::writer;
use crate::test_utils::writer_group;
use crate::test_utils::CapturingTransport;
use crate::test_utils::FakeSubscriptionClient;
use crate::EngineConfigurationModel;
use crate::PublisherConfig;
use crate::WriterGroupJobModel;

fn job(
    batch_size: usize,
    interval: Duration,
) -> WriterGroupJobModel {
    WriterGroupJobModel {
        writer_group: writer_group("group-1", vec![writer("w1", "opc.tcp://plc:4840", &["a", "b"])]),
        engine: Some(EngineConfigurationModel {
            batch_size: Some(batch_size),
            batch_trigger_interval: Some(interval),
            ..Default::default()
        }),
        ..Default::default()
    }
}

struct Fixture {
    client: Arc<FakeSubscriptionClient>,
    transport: Arc<CapturingTransport>,
    builder: WriterGroupBuilder,
}

fn fixture() -> Fixture {
    let client = FakeSubscriptionClient::new();
    let transport = CapturingTransport::new(64 * 1024);
    let builder = WriterGroupBuilder::new(Arc::new(PublisherConfig::default()), client.clone(), transport.clone());
    Fixture {
        client,
        transport,
        builder,
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_notifications_should_reach_the_transport() {
    enable_logger();
    let f = fixture();
    let group = f.builder.build(&job(10, Duration::from_millis(100))).unwrap();
    group.start().await.unwrap();
    assert_eq!(group.state(), WriterGroupState::Running);

    eventually(|| f.client.is_subscribed("w1")).await;
    assert!(f.client.emit("w1", vec![value_change("a", 1.0), value_change("b", 2.0)]).await);

    eventually(|| f.transport.sent_count() == 1).await;
    let message = &f.transport.messages()[0];
    assert_eq!(message.notification_count, 2);
    let body: serde_json::Value = serde_json::from_slice(&message.body).unwrap();
    assert_eq!(body.as_array().map(|a| a.len()), Some(2));

    group.stop().await;
    assert_eq!(group.diagnostic_info().outgress_sent_messages, 1);
}

/// # Case: the open batch is flushed while stopping
#[tokio::test]
async fn test_stop_should_flush_open_batch_and_close() {
    let f = fixture();
    let group = f.builder.build(&job(100, Duration::from_secs(600))).unwrap();
    group.start().await.unwrap();
    eventually(|| f.client.is_subscribed("w1")).await;

    f.client.emit("w1", vec![value_change("a", 1.0)]).await;
    eventually(|| group.diagnostic_info().ingress_batch_block_buffer_size == 1).await;
    assert_eq!(f.transport.sent_count(), 0);

    group.stop().await;
    assert_eq!(group.state(), WriterGroupState::Stopped);
    assert_eq!(f.transport.sent_count(), 1);
    assert!(!f.client.is_subscribed("w1"));

    // stopped groups are neither restarted nor updated
    assert!(group.start().await.is_err());
    assert!(group.update(&job(100, Duration::from_secs(600))).await.is_err());
    group.stop().await;
}

#[tokio::test]
async fn test_update_should_subscribe_new_writers_in_place() {
    let f = fixture();
    let group = f.builder.build(&job(10, Duration::from_millis(100))).unwrap();
    group.start().await.unwrap();
    eventually(|| f.client.is_subscribed("w1")).await;

    let mut next = job(10, Duration::from_millis(100));
    next.writer_group
        .data_set_writers
        .push(writer("w2", "opc.tcp://plc:4840", &["c"]));
    group.update(&next).await.unwrap();

    eventually(|| f.client.is_subscribed("w2")).await;
    assert!(f.client.is_subscribed("w1"));
    assert_eq!(group.job().writer_group.data_set_writers.len(), 2);
    group.stop().await;
}

#[tokio::test]
async fn test_start_twice_should_fail() {
    let f = fixture();
    let group = f.builder.build(&job(10, Duration::from_millis(100))).unwrap();
    group.start().await.unwrap();
    assert!(group.start().await.is_err());
    group.stop().await;
}

/// # Case 1: transport down, outgoing queue full, engine waiting on the sink
/// # Case 2: stop still returns and drops what could not be delivered
#[tokio::test]
async fn test_stop_should_not_hang_when_transport_down_and_queue_full_case1() {
    enable_logger();
    let f = fixture();
    f.transport.fail_next_sends(usize::MAX);
    let mut blocked = job(1, Duration::from_secs(600));
    if let Some(engine) = blocked.engine.as_mut() {
        engine.max_outgress_messages = Some(2);
    }
    let group = f.builder.build(&blocked).unwrap();
    group.start().await.unwrap();
    eventually(|| f.client.is_subscribed("w1")).await;

    // one message held by the worker, two queued, the rest back up the engine
    for i in 0..8 {
        assert!(f.client.emit("w1", vec![value_change("a", i as f64)]).await);
    }
    eventually(|| group.diagnostic_info().outgress_input_buffer_count == 2).await;
    sleep(Duration::from_millis(50)).await;

    timeout(Duration::from_secs(2), group.stop())
        .await
        .expect("stop should return with the transport down");
    assert_eq!(group.state(), WriterGroupState::Stopped);
    assert_eq!(f.transport.sent_count(), 0);
    assert!(!f.client.is_subscribed("w1"));
}
