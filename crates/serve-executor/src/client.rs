use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;
use serve_types::Envelope;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::status::{CancelAck, RuntimeState, StatusTick};

/// Speaks to the single backing agent runtime process over a local HTTP
/// endpoint. Every call carries an explicit `session_key`; this client
/// never falls back to implicit derivation on the callee side.
pub struct ExecutorClient {
    http: reqwest::Client,
    config: ExecutorConfig,
}

impl ExecutorClient {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Forwards an envelope and returns a channel of status ticks that ends
    /// after a terminal tick (`completed | failed | interrupted | timeout`).
    /// Retries transient network/5xx errors with bounded exponential
    /// backoff while the envelope's ownership is held by the caller.
    pub async fn forward(
        &self,
        envelope: &Envelope,
        session_key: &str,
    ) -> Result<mpsc::Receiver<StatusTick>, ExecutorError> {
        let body = json!({
            "event_id": envelope.id,
            "session_key": session_key,
            "source": envelope.source,
            "type": envelope.kind,
            "payload": envelope.payload,
        });

        self.with_retry(|| self.post_event(&body)).await?;

        let (tx, rx) = mpsc::channel(32);
        let event_id = envelope.id.clone();
        let http = self.http.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            poll_until_terminal(http, config, event_id, tx).await;
        });
        Ok(rx)
    }

    /// Best-effort cancellation; the dispatcher transitions the turn to
    /// `interrupted` regardless of whether the runtime honors it.
    pub async fn cancel(&self, event_id: &str) -> Result<CancelAck, ExecutorError> {
        let url = format!("{}/v1/runtime/events/{event_id}/cancel", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|source| ExecutorError::Network { url: url.clone(), source })?;
        handle_response(response).await
    }

    pub async fn status(&self, event_id: &str) -> Result<StatusTick, ExecutorError> {
        let url = format!("{}/v1/runtime/events/{event_id}", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ExecutorError::Network { url: url.clone(), source })?;
        handle_response(response).await
    }

    async fn post_event(&self, body: &serde_json::Value) -> Result<(), ExecutorError> {
        let url = format!("{}/v1/runtime/events", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| ExecutorError::Network { url: url.clone(), source })?;
        let _: serde_json::Value = handle_response(response).await?;
        Ok(())
    }

    async fn with_retry<F, Fut, T>(&self, mut attempt: F) -> Result<T, ExecutorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExecutorError>>,
    {
        let mut backoff = Duration::from_millis(100);
        let mut last_err = None;
        for attempt_no in 0..self.config.max_retries {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt_no + 1 < self.config.max_retries => {
                    warn!(attempt = attempt_no, error = %err, "retrying transient executor error");
                    time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, Duration::from_secs(10));
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(ExecutorError::RetriesExhausted {
            attempts: self.config.max_retries,
            last: Box::new(last_err.expect("loop always sets last_err before exhausting")),
        })
    }
}

async fn poll_until_terminal(
    http: reqwest::Client,
    config: ExecutorConfig,
    event_id: String,
    tx: mpsc::Sender<StatusTick>,
) {
    let deadline = time::Instant::now() + config.event_timeout;
    loop {
        if time::Instant::now() >= deadline {
            let _ = tx
                .send(StatusTick {
                    event_id: event_id.clone(),
                    state: RuntimeState::Failed,
                    elapsed_ms: config.event_timeout.as_millis() as i64,
                    text: "timeout".to_string(),
                    output: String::new(),
                    has_action: false,
                    action_refs: vec![],
                    error: Some("timeout".to_string()),
                })
                .await;
            return;
        }

        let url = format!("{}/v1/runtime/events/{event_id}", config.base_url);
        match http.get(&url).send().await {
            Ok(response) => match handle_response::<StatusTick>(response).await {
                Ok(tick) => {
                    let terminal = tick.state.is_terminal();
                    debug!(event_id = %event_id, state = ?tick.state, "executor status tick");
                    if tx.send(tick).await.is_err() {
                        return;
                    }
                    if terminal {
                        return;
                    }
                }
                Err(err) => {
                    warn!(event_id = %event_id, error = %err, "executor status poll failed");
                }
            },
            Err(source) => {
                warn!(event_id = %event_id, error = %source, "executor status poll network error");
            }
        }

        time::sleep(config.poll_interval).await;
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ExecutorError> {
    let status = response.status();
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        let body = response.text().await.unwrap_or_default();
        if body.contains("strict_missing_session_key") {
            return Err(ExecutorError::StrictMissingSessionKey);
        }
        return Err(ExecutorError::Http { status: status.as_u16(), body });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ExecutorError::Http { status: status.as_u16(), body });
    }
    response.json::<T>().await.map_err(|source| ExecutorError::Network {
        url: "response body".to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_matches_network_and_5xx() {
        let network_err = ExecutorError::Http { status: 502, body: String::new() };
        assert!(network_err.is_transient());
        let client_err = ExecutorError::Http { status: 404, body: String::new() };
        assert!(!client_err.is_transient());
        assert!(!ExecutorError::StrictMissingSessionKey.is_transient());
    }
}
