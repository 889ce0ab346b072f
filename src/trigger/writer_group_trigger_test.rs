use std::sync::Arc;
use std::time::Duration;

use mockall::Sequence;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::test_utils::enable_logger;
use crate::test_utils::value_change;
use crate::test_utils::writer;
use crate::test_utils::FakeSubscriptionClient;
use crate::BackoffPolicy;
use crate::NetworkError;
use crate::SubscriptionNotificationModel;

const URL: &str = "opc.tcp://plc:4840";

fn policy() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 0,
        timeout_ms: 1_000,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
    }
}

fn trigger(
    client: Arc<dyn SubscriptionClient>,
    writers: Vec<crate::DataSetWriterModel>,
) -> (WriterGroupMessageTrigger, mpsc::Receiver<SubscriptionNotificationModel>) {
    let (tx, rx) = mpsc::channel(16);
    let trigger = WriterGroupMessageTrigger::new(
        "group-1",
        crate::test_utils::connection(URL),
        writers,
        client,
        policy(),
        tx,
    );
    (trigger, rx)
}

async fn next(rx: &mut mpsc::Receiver<SubscriptionNotificationModel>) -> SubscriptionNotificationModel {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification expected")
        .expect("channel open")
}

#[tokio::test]
async fn test_start_should_subscribe_every_writer_and_forward_notifications() {
    enable_logger();
    let client = FakeSubscriptionClient::new();
    let (trigger, mut rx) = trigger(
        client.clone(),
        vec![writer("w1", URL, &["a", "b"]), writer("w2", URL, &["c"])],
    );

    trigger.start(CancellationToken::new()).await.unwrap();
    assert_eq!(client.subscribe_calls().len(), 2);
    assert_eq!(trigger.counters().good_nodes, 3);
    assert!(trigger.counters().is_connection_ok);

    assert!(client.emit("w2", vec![value_change("c", 1.0)]).await);
    let n = next(&mut rx).await;
    assert_eq!(n.data_set_writer_name(), "w2");
    assert_eq!(n.endpoint_url, URL);
    assert_eq!(n.application_uri.as_deref(), Some("urn:fake"));
    let context = n.context.expect("writer context attached");
    assert_eq!(context.writer_group_id, "group-1");

    let counters = trigger.counters();
    assert_eq!(counters.value_changes, 1);
    assert_eq!(counters.data_changes, 1);

    trigger.stop().await;
}

/// # Case: second writer fails, first subscription is torn down again
#[tokio::test]
async fn test_start_failure_should_clean_up_created_subscriptions() {
    enable_logger();
    let mut client = MockSubscriptionClient::new();
    let mut seq = Sequence::new();
    // keep the sender alive so the first subscription does not look lost
    let (event_tx, event_rx) = mpsc::channel(1);
    let mut event_rx = Some(event_rx);
    client
        .expect_subscribe()
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_, s| {
            Ok(SubscriptionHandle {
                subscription_id: s.id,
                application_uri: None,
                good_nodes: 1,
                bad_nodes: 0,
                events: event_rx.take().expect("subscribed once"),
            })
        });
    client
        .expect_subscribe()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, s| {
            Err(NetworkError::SubscriptionFailed {
                endpoint_url: URL.to_string(),
                subscription_id: s.id,
                reason: "BadTooManySubscriptions".to_string(),
            }
            .into())
        });
    client
        .expect_unsubscribe()
        .times(1)
        .withf(|_, id| id == "group-1:w1")
        .returning(|_, _| Ok(()));

    let (trigger, _rx) = trigger(
        Arc::new(client),
        vec![writer("w1", URL, &["a"]), writer("w2", URL, &["b"])],
    );

    assert!(trigger.start(CancellationToken::new()).await.is_err());
    assert_eq!(trigger.counters().good_nodes, 0);
    drop(event_tx);
}

/// # Case 1: loss flips the connection flag and counts a retry
/// # Case 2: the flag stays down after re-subscribing until data arrives again
#[tokio::test]
async fn test_connection_loss_should_resubscribe_with_backoff() {
    enable_logger();
    tokio::time::pause();
    let client = FakeSubscriptionClient::new();
    let (trigger, mut rx) = trigger(client.clone(), vec![writer("w1", URL, &["a"])]);
    trigger.start(CancellationToken::new()).await.unwrap();

    client.fail_next_subscribes(2);
    client.drop_connection("w1").await;

    // 2 failing attempts, then success
    for _ in 0..100 {
        if client.is_subscribed("w1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(client.is_subscribed("w1"));
    let counters = trigger.counters();
    assert_eq!(counters.connection_retries, 3);
    assert!(!counters.is_connection_ok);
    assert_eq!(client.subscribe_calls().len(), 4);

    assert!(client.emit("w1", vec![value_change("a", 2.0)]).await);
    next(&mut rx).await;
    assert!(trigger.counters().is_connection_ok);

    trigger.stop().await;
}

#[tokio::test]
async fn test_reconfigure_should_only_touch_changed_writers() {
    enable_logger();
    let client = FakeSubscriptionClient::new();
    let (trigger, _rx) = trigger(
        client.clone(),
        vec![writer("w1", URL, &["a"]), writer("w2", URL, &["b"])],
    );
    trigger.start(CancellationToken::new()).await.unwrap();
    assert_eq!(client.subscribe_calls().len(), 2);

    // w1 unchanged, w2 removed, w3 added
    trigger
        .reconfigure(vec![writer("w1", URL, &["a"]), writer("w3", URL, &["c"])])
        .await
        .unwrap();

    let calls = client.subscribe_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].data_set_writer_name, "w3");
    assert_eq!(client.unsubscribed().len(), 1);
    assert!(client.is_subscribed("w1"));
    assert!(!client.is_subscribed("w2"));
    assert!(client.is_subscribed("w3"));

    // changed variables of w1 re-create its subscription
    trigger
        .reconfigure(vec![writer("w1", URL, &["a", "z"]), writer("w3", URL, &["c"])])
        .await
        .unwrap();
    let calls = client.subscribe_calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3].monitored_items.len(), 2);
    assert_eq!(trigger.writers().len(), 2);

    trigger.stop().await;
    assert!(!client.is_subscribed("w1"));
    assert!(!client.is_subscribed("w3"));
}

#[tokio::test]
async fn test_reconfigure_before_start_should_only_store_writers() {
    let client = FakeSubscriptionClient::new();
    let (trigger, _rx) = trigger(client.clone(), vec![writer("w1", URL, &["a"])]);

    trigger
        .reconfigure(vec![writer("w1", URL, &["a"]), writer("w2", URL, &["b"])])
        .await
        .unwrap();
    assert!(client.subscribe_calls().is_empty());

    trigger.start(CancellationToken::new()).await.unwrap();
    assert_eq!(client.subscribe_calls().len(), 2);
    trigger.stop().await;
}

/// # Case: writers changed while the initial subscriptions are still being
/// created are applied once start finishes
#[tokio::test]
async fn test_reconfigure_during_start_should_keep_new_writers() {
    enable_logger();
    let client = FakeSubscriptionClient::new();
    client.set_subscribe_delay(Duration::from_millis(200));
    let (trigger, _rx) = trigger(client.clone(), vec![writer("w1", URL, &["a"])]);
    let trigger = Arc::new(trigger);

    let starting = tokio::spawn({
        let trigger = trigger.clone();
        async move { trigger.start(CancellationToken::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger
        .reconfigure(vec![writer("w1", URL, &["a"]), writer("w2", URL, &["b"])])
        .await
        .unwrap();
    starting.await.unwrap().unwrap();

    assert_eq!(trigger.writers().len(), 2);
    assert!(client.is_subscribed("w1"));
    assert!(client.is_subscribed("w2"));
    trigger.stop().await;
}

/// # Case 1: stopping while a notification waits for room in the channel
/// # Case 2: the waiting notification is still handed over once drained
#[tokio::test]
async fn test_stop_should_deliver_in_flight_notification_case1() {
    enable_logger();
    let client = FakeSubscriptionClient::new();
    let (tx, mut rx) = mpsc::channel(1);
    let trigger = Arc::new(WriterGroupMessageTrigger::new(
        "group-1",
        crate::test_utils::connection(URL),
        vec![writer("w1", URL, &["a"])],
        client.clone(),
        policy(),
        tx,
    ));
    trigger.start(CancellationToken::new()).await.unwrap();

    // first fills the channel, second is held by the subscription task
    assert!(client.emit("w1", vec![value_change("a", 1.0)]).await);
    assert!(client.emit("w1", vec![value_change("a", 2.0)]).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopping = tokio::spawn({
        let trigger = trigger.clone();
        async move { trigger.stop().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let first = next(&mut rx).await;
    let second = next(&mut rx).await;
    assert_eq!(first.notifications[0].value.value, crate::Variant::Double(1.0));
    assert_eq!(second.notifications[0].value.value, crate::Variant::Double(2.0));
    timeout(Duration::from_secs(1), stopping).await.unwrap().unwrap();
    assert!(!client.is_subscribed("w1"));
}
