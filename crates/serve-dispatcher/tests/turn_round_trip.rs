mod support;

use std::time::Duration;

use serde_json::json;
use serve_dispatcher::DispatcherConfig;
use serve_types::{methods, TurnState};
use support::{mount_immediate_completion, wait_for_lines, Harness};

#[tokio::test]
async fn turn_start_streams_started_progress_and_completed_to_subscribers() {
    let harness = Harness::build(DispatcherConfig::default()).await;
    mount_immediate_completion(&harness.mock_server, "completed", true).await;

    let (_id, mut notifications) = harness.dispatcher.notifier().subscribe();
    let synthetic = notifications.recv().await.unwrap();
    assert_eq!(synthetic.method, methods::THREAD_STARTED);

    let thread = harness.dispatcher.start_thread(None);
    let turn = harness
        .dispatcher
        .start_turn(&thread.id, json!({"text": "do the thing"}))
        .await
        .unwrap();
    assert_eq!(turn.state, TurnState::Queued);

    let started = notifications.recv().await.unwrap();
    assert_eq!(started.method, methods::TURN_STARTED);
    assert_eq!(started.params["turn_id"], turn.turn_id);

    let completed = loop {
        let next = notifications.recv().await.unwrap();
        if next.method == methods::TURN_COMPLETED {
            break next;
        }
        assert_eq!(next.method, methods::TURN_PROGRESS);
    };
    assert_eq!(completed.params["turn_id"], turn.turn_id);

    let resolved = harness.dispatcher.get_turn(&turn.turn_id).unwrap();
    assert_eq!(resolved.state, TurnState::Completed);
    assert_eq!(resolved.output, "the result");

    let outcomes = wait_for_lines(&harness.actions_log(), 1, Duration::from_secs(2)).await;
    assert_eq!(outcomes[0]["has_action"], true);
}
