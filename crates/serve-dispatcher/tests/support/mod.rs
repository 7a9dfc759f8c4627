use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use serve_dispatcher::{Dispatcher, DispatcherConfig};
use serve_executor::ExecutorConfig;
use tempfile::TempDir;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// A running dispatcher plus the fake backing agent runtime it talks to and
/// the temp dir its NDJSON logs land in.
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub mock_server: MockServer,
    pub state_dir: TempDir,
}

impl Harness {
    pub async fn build(mut config: DispatcherConfig) -> Self {
        let mock_server = MockServer::start().await;
        let state_dir = tempfile::tempdir().unwrap();
        config.event_timeout = Duration::from_millis(2000);
        let executor_config = ExecutorConfig {
            poll_interval: Duration::from_millis(20),
            event_timeout: config.event_timeout,
            ..ExecutorConfig::new(mock_server.uri())
        };
        let dispatcher = Dispatcher::new(config, state_dir.path(), executor_config)
            .await
            .unwrap();
        Self { dispatcher, mock_server, state_dir }
    }

    pub fn events_log(&self) -> PathBuf {
        self.state_dir.path().join("events.ndjson")
    }

    pub fn decisions_log(&self) -> PathBuf {
        self.state_dir.path().join("decisions.ndjson")
    }

    pub fn actions_log(&self) -> PathBuf {
        self.state_dir.path().join("actions.ndjson")
    }

    pub fn activity_log(&self) -> PathBuf {
        self.state_dir.path().join("activity-ledger.ndjson")
    }
}

/// Mounts a POST-accept + immediately-terminal GET pair so a forwarded
/// envelope completes on the first status poll.
pub async fn mount_immediate_completion(server: &MockServer, status: &str, has_action: bool) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/runtime/events$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/runtime/events/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "event_id": "placeholder",
            "state": status,
            "elapsed_ms": 5,
            "text": "done",
            "output": if status == "completed" { "the result" } else { "" },
            "has_action": has_action,
            "action_refs": Value::Array(vec![]),
            "error": Value::Null,
        })))
        .mount(server)
        .await;
}

/// Reports `running` for the first `running_ticks` polls, then flips to a
/// terminal state for every poll after that, so tests can interrupt a turn
/// mid-flight and then observe it actually reach a terminal tick.
struct SequencedStatusResponder {
    calls: AtomicUsize,
    running_ticks: usize,
    terminal_state: &'static str,
}

impl Respond for SequencedStatusResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let state = if call < self.running_ticks { "running" } else { self.terminal_state };
        ResponseTemplate::new(200).set_body_json(json!({
            "event_id": "placeholder",
            "state": state,
            "elapsed_ms": 5,
            "text": if state == "running" { "working" } else { "done" },
            "output": if state == "running" { "" } else { "partial output" },
            "has_action": false,
            "action_refs": Value::Array(vec![]),
            "error": Value::Null,
        }))
    }
}

/// Mounts a POST-accept plus a GET that reports `running` for
/// `running_ticks` polls and then `terminal_state` forever after, plus a
/// cancel endpoint that always acknowledges.
pub async fn mount_sequenced_status(server: &MockServer, running_ticks: usize, terminal_state: &'static str) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/runtime/events$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": true})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/runtime/events/.+$"))
        .respond_with(SequencedStatusResponder {
            calls: AtomicUsize::new(0),
            running_ticks,
            terminal_state,
        })
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/runtime/events/.+/cancel$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "event_id": "placeholder",
            "accepted": true,
        })))
        .mount(server)
        .await;
}

/// Polls `path` until it has at least `expected_lines` NDJSON lines, or
/// panics once `timeout` elapses. Dispatcher work runs on spawned tasks, so
/// tests must wait rather than assert immediately after a call returns.
pub async fn wait_for_lines(path: &Path, expected_lines: usize, timeout: Duration) -> Vec<Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let lines = read_lines(path);
        if lines.len() >= expected_lines {
            return lines;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "timed out waiting for {} lines in {}, saw {}",
                expected_lines,
                path.display(),
                lines.len()
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn read_lines(path: &Path) -> Vec<Value> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).expect("log line is valid json"))
            .collect(),
        Err(_) => vec![],
    }
}
