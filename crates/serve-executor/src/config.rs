use std::time::Duration;

/// Default total execution deadline per envelope: 60 minutes.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_millis(3_600_000);
/// Default progress-heartbeat cadence while polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
/// Default bounded retry attempts for transient network/5xx errors.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Base URL of the backing agent runtime, e.g. `http://127.0.0.1:9000`.
    pub base_url: String,
    pub event_timeout: Duration,
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl ExecutorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            event_timeout: DEFAULT_EVENT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}
