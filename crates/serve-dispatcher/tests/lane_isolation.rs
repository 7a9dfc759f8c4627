mod support;

use std::time::Duration;

use serde_json::json;
use serve_dispatcher::DispatcherConfig;
use serve_ledger::TransportHeaders;
use serve_types::{EventSource, OutcomeStatus};
use support::{mount_immediate_completion, wait_for_lines, Harness};

#[tokio::test]
async fn concurrent_events_across_two_session_keys_stay_isolated_and_fifo() {
    let harness = Harness::build(DispatcherConfig::default()).await;
    mount_immediate_completion(&harness.mock_server, "completed", false).await;

    for key in ["session-a", "session-b"] {
        for i in 0..10 {
            let payload = json!({"session_key": key, "seq": i});
            harness
                .dispatcher
                .accept(EventSource::Serve, payload, TransportHeaders::default())
                .await
                .unwrap();
        }
    }

    let outcomes = wait_for_lines(&harness.actions_log(), 20, Duration::from_secs(5)).await;
    assert_eq!(outcomes.len(), 20);
    assert!(outcomes.iter().all(|o| o["status"] == serde_json::to_value(OutcomeStatus::Ok).unwrap()));

    let events = wait_for_lines(&harness.events_log(), 20, Duration::from_secs(1)).await;
    let seq_of: std::collections::HashMap<String, (String, i64)> = events
        .iter()
        .map(|e| {
            let id = e["id"].as_str().unwrap().to_string();
            let key = e["payload"]["session_key"].as_str().unwrap().to_string();
            let seq = e["payload"]["seq"].as_i64().unwrap();
            (id, (key, seq))
        })
        .collect();

    let mut seen_seq: std::collections::HashMap<&str, Vec<i64>> = std::collections::HashMap::new();
    for outcome in &outcomes {
        let event_id = outcome["event_id"].as_str().unwrap();
        let (key, seq) = &seq_of[event_id];
        let key: &'static str = if key == "session-a" { "session-a" } else { "session-b" };
        seen_seq.entry(key).or_default().push(*seq);
    }
    assert_eq!(seen_seq["session-a"], (0..10).collect::<Vec<_>>());
    assert_eq!(seen_seq["session-b"], (0..10).collect::<Vec<_>>());

    assert_eq!(harness.dispatcher.status().active_lanes, 2);
}
