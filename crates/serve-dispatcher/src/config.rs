use std::collections::HashSet;
use std::time::Duration;

/// Named configuration options. Not a file format of its own; the `serve`
/// binary loads these from TOML + environment overrides.
#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub max_body_bytes: usize,
    pub channel_timeout: Duration,
    pub processed_keys_cap: usize,
    pub global_concurrency: usize,
    pub lane_queue_cap: usize,
    pub event_timeout: Duration,
    pub progress_heartbeat: Duration,
    pub keepalive: Duration,
    pub always_emit_event_types: HashSet<String>,
    /// Whether a cancelled turn's partial assistant output is preserved in
    /// the outcome record/log, or cleared.
    pub preserve_partial_output_on_interrupt: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            channel_timeout: Duration::from_millis(5000),
            processed_keys_cap: 2000,
            global_concurrency: 4,
            lane_queue_cap: 64,
            event_timeout: Duration::from_millis(3_600_000),
            progress_heartbeat: Duration::from_millis(3000),
            keepalive: Duration::from_millis(3000),
            always_emit_event_types: HashSet::new(),
            preserve_partial_output_on_interrupt: true,
        }
    }
}
