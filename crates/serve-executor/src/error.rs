use thiserror::Error;

/// Errors surfaced while talking to the backing agent runtime.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to reach the runtime at `{url}`: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("runtime returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("runtime rejected the call: strict_missing_session_key (client bug)")]
    StrictMissingSessionKey,
    #[error("event `{event_id}` exceeded its deadline")]
    Timeout { event_id: String },
    #[error("failed to (de)serialize runtime payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ExecutorError> },
}

impl ExecutorError {
    /// Transient errors may be retried with backoff; terminal ones fail the
    /// outcome immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecutorError::Network { .. } | ExecutorError::Http { status: 500..=599, .. }
        )
    }
}
