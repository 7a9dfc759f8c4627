use serde::{Deserialize, Serialize};

/// Runtime-reported execution state for a forwarded event: the in-flight
/// states (`queued`, `running`, `waiting`, `cancel_requested`) plus the
/// terminal states the runtime can report.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Queued,
    Running,
    Waiting,
    CancelRequested,
    Completed,
    Interrupted,
    Failed,
}

impl RuntimeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RuntimeState::Completed | RuntimeState::Interrupted | RuntimeState::Failed
        )
    }
}

/// One status tick from the runtime, whether polled or streamed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusTick {
    pub event_id: String,
    pub state: RuntimeState,
    pub elapsed_ms: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub has_action: bool,
    #[serde(default)]
    pub action_refs: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Best-effort acknowledgement of a cancellation request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelAck {
    pub event_id: String,
    pub accepted: bool,
}
