use serde::{Deserialize, Serialize};

/// Client-visible conversation lifecycle state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Running,
    Paused,
    Closed,
}

/// A client-visible conversation. Each thread maps to exactly one session
/// key; multiple threads may share the backing runtime but never a session
/// key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub session_key: String,
    pub state: ThreadState,
    pub started_at: i64,
}

impl Thread {
    pub fn new(id: impl Into<String>, session_key: impl Into<String>, started_at: i64) -> Self {
        Self {
            id: id.into(),
            session_key: session_key.into(),
            state: ThreadState::Running,
            started_at,
        }
    }

    /// The always-present default thread created at startup.
    pub fn main(started_at: i64) -> Self {
        Self::new("main", "main", started_at)
    }
}
