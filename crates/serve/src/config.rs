use std::path::{Path, PathBuf};

use serde::Deserialize;
use serve_dispatcher::DispatcherConfig;

/// Top-level process configuration: a TOML file provides the base, then a
/// handful of environment variables override individual fields. Layering
/// order is always defaults, then file, then explicit environment
/// overrides.
#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub state_dir: PathBuf,
    pub bind_addr: String,
    pub executor_base_url: String,
    pub log_level: String,
    pub dispatcher: DispatcherConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("./serve-state"),
            bind_addr: "127.0.0.1:8077".to_string(),
            executor_base_url: "http://127.0.0.1:8090".to_string(),
            log_level: "info".to_string(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

/// On-disk TOML shape. Every field is optional so a partial file only
/// overrides what it names; absent fields fall back to `ServeConfig::default`.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    state_dir: Option<PathBuf>,
    bind_addr: Option<String>,
    executor_base_url: Option<String>,
    log_level: Option<String>,
    max_body_bytes: Option<usize>,
    global_concurrency: Option<usize>,
    lane_queue_cap: Option<usize>,
    processed_keys_cap: Option<usize>,
    preserve_partial_output_on_interrupt: Option<bool>,
}

impl ServeConfig {
    /// Loads configuration from `path` (if given) layered over defaults,
    /// then applies `SERVE_*` environment variable overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            let raw = std::fs::read_to_string(path)
                .map_err(|source| anyhow::anyhow!("reading config file {}: {source}", path.display()))?;
            let file: FileConfig = toml::from_str(&raw)
                .map_err(|source| anyhow::anyhow!("parsing config file {}: {source}", path.display()))?;
            config.apply_file(file);
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.state_dir {
            self.state_dir = v;
        }
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.executor_base_url {
            self.executor_base_url = v;
        }
        if let Some(v) = file.log_level {
            self.log_level = v;
        }
        if let Some(v) = file.max_body_bytes {
            self.dispatcher.max_body_bytes = v;
        }
        if let Some(v) = file.global_concurrency {
            self.dispatcher.global_concurrency = v;
        }
        if let Some(v) = file.lane_queue_cap {
            self.dispatcher.lane_queue_cap = v;
        }
        if let Some(v) = file.processed_keys_cap {
            self.dispatcher.processed_keys_cap = v;
        }
        if let Some(v) = file.preserve_partial_output_on_interrupt {
            self.dispatcher.preserve_partial_output_on_interrupt = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("SERVE_STATE_DIR") {
            self.state_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SERVE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("SERVE_EXECUTOR_URL") {
            self.executor_base_url = v;
        }
        if let Ok(v) = std::env::var("SERVE_LOG_LEVEL") {
            self.log_level = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_bind_addr() {
        let config = ServeConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8077");
    }

    #[test]
    fn file_config_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serve.toml");
        std::fs::write(&path, "bind_addr = \"0.0.0.0:9000\"\n").unwrap();
        let config = ServeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.executor_base_url, ServeConfig::default().executor_base_url);
    }
}
