mod support;

use std::time::Duration;

use serde_json::json;
use serve_dispatcher::{AcceptOutcome, Decision, DispatcherConfig};
use serve_ledger::TransportHeaders;
use serve_types::EventSource;
use support::{wait_for_lines, Harness};

#[tokio::test]
async fn non_object_payload_is_recorded_as_skipped_normalize_failed() {
    let harness = Harness::build(DispatcherConfig::default()).await;

    let outcome = harness
        .dispatcher
        .accept(EventSource::Github, json!("not-an-object"), TransportHeaders::default())
        .await
        .unwrap();
    assert_eq!(outcome, AcceptOutcome::NormalizeFailed);

    let decisions = wait_for_lines(&harness.decisions_log(), 1, Duration::from_secs(2)).await;
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0]["decision"], serde_json::to_value(Decision::SkippedNormalizeFailed).unwrap());
    assert_eq!(decisions[0]["reason"], "normalize_failed");

    assert!(
        harness.mock_server.received_requests().await.unwrap().is_empty(),
        "an unnormalizable payload never reaches the backing executor"
    );
}
