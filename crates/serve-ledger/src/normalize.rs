use serde_json::Value;
use serve_types::{dedupe_key_of, now_millis, Envelope, EventSource, IdGenerator, Scope, Subject};

use crate::error::LedgerError;

/// Raw, source-specific headers that get copied verbatim into the payload
/// before normalization.
#[derive(Clone, Debug, Default)]
pub struct TransportHeaders {
    pub delivery_id: Option<String>,
    pub event_hint: Option<String>,
}

/// Converts a raw payload into a canonical, immutable `Envelope`.
pub struct Normalizer {
    ids: IdGenerator,
}

impl Normalizer {
    pub fn new() -> Self {
        Self {
            ids: IdGenerator::new("evt"),
        }
    }

    /// Normalizes a raw payload into an `Envelope`. `id`/`received_at` are
    /// populated if absent from the payload; `type`/`scope.repo` are
    /// derived from well-known payload keys.
    pub fn normalize(
        &self,
        source: EventSource,
        mut payload: Value,
        headers: TransportHeaders,
    ) -> Result<Envelope, LedgerError> {
        let obj = payload.as_object_mut().ok_or_else(|| LedgerError::NormalizeFailed {
            reason: "payload is not a JSON object".to_string(),
        })?;

        if let Some(event_hint) = headers.event_hint.as_deref() {
            obj.insert(
                "x_github_event".to_string(),
                Value::String(event_hint.to_string()),
            );
        }
        if let Some(delivery_id) = headers.delivery_id.as_deref() {
            obj.insert(
                "x_github_delivery".to_string(),
                Value::String(delivery_id.to_string()),
            );
        }

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.ids.next());

        let received_at = obj
            .get("received_at")
            .and_then(Value::as_i64)
            .unwrap_or_else(now_millis);

        let partition = obj
            .get("partition")
            .and_then(Value::as_str)
            .map(str::to_string);

        let kind = derive_type(&payload, &headers);
        let scope = Scope {
            repo: derive_repo(&payload),
            partition,
        };
        let subject = derive_subject(&payload);
        let action = payload.get("action").and_then(Value::as_str);

        let dedupe_key = dedupe_key_of(
            headers.delivery_id.as_deref(),
            source,
            &kind,
            subject.as_ref(),
            action,
            &payload,
        );

        Ok(Envelope {
            id,
            source,
            kind,
            scope,
            subject,
            payload,
            received_at,
            dedupe_key,
        })
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

fn derive_type(payload: &Value, headers: &TransportHeaders) -> String {
    if let Some(explicit) = payload.get("type").and_then(Value::as_str) {
        return explicit.to_string();
    }
    if let Some(hint) = headers.event_hint.as_deref() {
        return github_event_type(payload, hint);
    }
    if let Some(hint) = payload.get("x_github_event").and_then(Value::as_str) {
        return github_event_type(payload, hint);
    }
    if let Some(event) = payload.get("event").and_then(Value::as_str) {
        return event.to_string();
    }
    "serve.unknown".to_string()
}

fn github_event_type(payload: &Value, hint: &str) -> String {
    match payload.get("action").and_then(Value::as_str) {
        Some(action) => format!("github.{hint}.{action}"),
        None => format!("github.{hint}"),
    }
}

fn derive_repo(payload: &Value) -> Option<String> {
    payload
        .get("repository")
        .and_then(|r| r.get("full_name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn derive_subject(payload: &Value) -> Option<Subject> {
    for key in ["issue", "pull_request", "comment"] {
        if let Some(entity) = payload.get(key) {
            if let Some(id) = entity.get("id").and_then(id_as_string) {
                return Some(Subject {
                    kind: key.to_string(),
                    id,
                });
            }
        }
    }
    None
}

fn id_as_string(value: &Value) -> Option<String> {
    if let Some(n) = value.as_i64() {
        return Some(n.to_string());
    }
    value.as_str().map(str::to_string)
}
