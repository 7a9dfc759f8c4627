use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Where an envelope originated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Github,
    Timer,
    Rpc,
    Serve,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventSource::Github => "github",
            EventSource::Timer => "timer",
            EventSource::Rpc => "rpc",
            EventSource::Serve => "serve",
        };
        f.write_str(s)
    }
}

/// Routing scope carried alongside an envelope.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

/// The entity an envelope is "about" (an issue, a comment, a turn, ...).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: String,
    pub id: String,
}

/// Canonical, immutable-once-logged input record.
///
/// Fields must not be mutated after the envelope is appended to the ledger;
/// callers that need to track execution state do so in the `Turn` table,
/// keyed by `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub source: EventSource,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,
    pub payload: Value,
    pub received_at: i64,
    pub dedupe_key: String,
}

impl Envelope {
    /// Session key this envelope must be serialized against.
    pub fn session_key(&self) -> String {
        session_key_of(self)
    }
}

/// Routing lane name. For `source = rpc` envelopes this is the normalized
/// thread id; for everything else it's derived from the payload, scope,
/// and subject in turn, falling back to `main`.
pub fn session_key_of(envelope: &Envelope) -> String {
    if envelope.source == EventSource::Rpc {
        let thread_id = envelope
            .payload
            .get("thread_id")
            .and_then(Value::as_str)
            .unwrap_or("");
        return normalize_thread_id(thread_id);
    }

    if let Some(key) = envelope
        .payload
        .get("session_key")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        return key.to_string();
    }
    if let Some(partition) = envelope.scope.partition.as_deref().filter(|s| !s.is_empty()) {
        return partition.to_string();
    }
    if let Some(repo) = envelope.scope.repo.as_deref().filter(|s| !s.is_empty()) {
        return repo.to_string();
    }
    if let Some(subject) = &envelope.subject {
        return format!("{}:{}", envelope.source, subject.kind);
    }
    format!("{}:{}", envelope.source, envelope.kind)
}

/// Normalizes an RPC thread id into a session key; empty becomes `main`.
pub fn normalize_thread_id(thread_id: &str) -> String {
    if thread_id.trim().is_empty() {
        "main".to_string()
    } else {
        thread_id.trim().to_string()
    }
}

/// Derives the dedupe key for a payload, preferring in order: delivery id,
/// then a composite key, then a content hash.
pub fn dedupe_key_of(
    delivery_id: Option<&str>,
    source: EventSource,
    kind: &str,
    subject: Option<&Subject>,
    action: Option<&str>,
    payload: &Value,
) -> String {
    if let Some(id) = delivery_id.filter(|s| !s.is_empty()) {
        return format!("delivery:{id}");
    }

    if let Some(subject) = subject {
        let action = action.unwrap_or("-");
        return format!("{source}:{kind}:{}:{}:{action}", subject.kind, subject.id);
    }

    let digest = Sha256::digest(payload.to_string().as_bytes());
    format!("content:{digest:x}")
}
