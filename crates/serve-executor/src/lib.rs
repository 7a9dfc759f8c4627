//! Executor client: forwards dispatched work to the single backing agent
//! runtime over a local HTTP endpoint, polling status until terminal, with
//! bounded retry on transient failures.

mod client;
mod config;
mod error;
mod status;

pub use client::ExecutorClient;
pub use config::{ExecutorConfig, DEFAULT_EVENT_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL};
pub use error::ExecutorError;
pub use status::{CancelAck, RuntimeState, StatusTick};
