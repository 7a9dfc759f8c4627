use serde::{Deserialize, Serialize};

/// What the dispatcher did with an incoming envelope, logged to
/// `decisions.ndjson`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Forwarded,
    SkippedDuplicate,
    SkippedEpochStale,
    SkippedLaneFull,
    SkippedNormalizeFailed,
    SkippedPaused,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub event_id: String,
    pub dedupe_key: String,
    pub session_key: String,
    pub decision: Decision,
    pub reason: String,
    pub at: i64,
}
