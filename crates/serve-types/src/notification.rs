use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC 2.0 message with no `id`, broadcast to every active
/// subscriber and never replied to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }

    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self).expect("Notification always serializes");
        line.push('\n');
        line
    }
}

pub mod methods {
    pub const THREAD_STARTED: &str = "thread/started";
    pub const THREAD_RESUMED: &str = "thread/resumed";
    pub const THREAD_PAUSED: &str = "thread/paused";
    pub const THREAD_CLOSED: &str = "thread/closed";
    pub const TURN_STARTED: &str = "turn/started";
    pub const TURN_PROGRESS: &str = "turn/progress";
    pub const TURN_COMPLETED: &str = "turn/completed";
    pub const TURN_INTERRUPTED: &str = "turn/interrupted";
    pub const TURN_FAILED: &str = "turn/failed";
    pub const ITEM_CREATED: &str = "item/created";
    pub const ITEM_UPDATED: &str = "item/updated";
    pub const ITEM_DELETED: &str = "item/deleted";
    pub const EVENT_RECEIVED: &str = "event/received";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_without_id() {
        let n = Notification::new(methods::TURN_STARTED, serde_json::json!({"turn_id": "U1"}));
        let value = serde_json::to_value(&n).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["method"], "turn/started");
    }

    #[test]
    fn ndjson_line_is_newline_terminated() {
        let n = Notification::new(methods::EVENT_RECEIVED, serde_json::json!({}));
        assert!(n.to_ndjson_line().ends_with('\n'));
    }
}
