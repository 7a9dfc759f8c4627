use serde::Serialize;

/// Response body for the `holon/status` RPC method.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub events_processed: u64,
    pub last_event_at: Option<i64>,
    pub active_lanes: usize,
    pub uptime_ms: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Paused,
}
