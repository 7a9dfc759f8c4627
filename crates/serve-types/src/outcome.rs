use serde::{Deserialize, Serialize};

/// Per-event execution result, written exactly once per processed
/// (non-duplicate) envelope.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Ok,
    Skipped,
    Failed,
    Interrupted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub event_id: String,
    pub status: OutcomeStatus,
    pub has_action: bool,
    #[serde(default)]
    pub action_refs: Vec<String>,
    pub message: String,
    pub completed_at: i64,
}

impl OutcomeRecord {
    /// Whether this outcome must be surfaced to the UI per the activity
    /// gate, given the caller's always-emit allowlist membership check
    /// already applied.
    pub fn passes_gate(&self, type_is_always_emit: bool) -> bool {
        matches!(self.status, OutcomeStatus::Failed | OutcomeStatus::Interrupted)
            || self.has_action
            || type_is_always_emit
    }
}
