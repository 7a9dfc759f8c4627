mod support;

use std::time::Duration;

use serde_json::json;
use serve_dispatcher::DispatcherConfig;
use serve_ledger::TransportHeaders;
use serve_types::{methods, EventSource};
use support::{mount_immediate_completion, wait_for_lines, Harness};

#[tokio::test]
async fn quiet_ok_outcome_is_suppressed_from_broadcast_but_still_ledgered() {
    let harness = Harness::build(DispatcherConfig::default()).await;
    mount_immediate_completion(&harness.mock_server, "completed", false).await;

    let (_id, mut notifications) = harness.dispatcher.notifier().subscribe();
    let _ = notifications.recv().await.unwrap(); // synthetic thread/started

    harness
        .dispatcher
        .accept(EventSource::Timer, json!({"type": "timer.tick"}), TransportHeaders::default())
        .await
        .unwrap();

    let activity = wait_for_lines(&harness.activity_log(), 1, Duration::from_secs(2)).await;
    assert_eq!(activity[0]["gated"], true);

    // No item/created broadcast should ever arrive for this quiet outcome;
    // confirm the notifier has nothing further queued rather than blocking
    // forever waiting for one.
    let result = tokio::time::timeout(Duration::from_millis(200), notifications.recv()).await;
    assert!(result.is_err(), "expected no notification, got one");
}

#[tokio::test]
async fn outcome_with_an_action_is_broadcast_as_item_created() {
    let harness = Harness::build(DispatcherConfig::default()).await;
    mount_immediate_completion(&harness.mock_server, "completed", true).await;

    let (_id, mut notifications) = harness.dispatcher.notifier().subscribe();
    let _ = notifications.recv().await.unwrap();

    harness
        .dispatcher
        .accept(EventSource::Timer, json!({"type": "timer.tick"}), TransportHeaders::default())
        .await
        .unwrap();

    let emitted = tokio::time::timeout(Duration::from_secs(2), notifications.recv())
        .await
        .expect("notification expected before timeout")
        .unwrap();
    assert_eq!(emitted.method, methods::ITEM_CREATED);
}
