//! Canonical data model shared by every `serve` dispatcher crate: envelopes,
//! session-key routing, threads, turns, outcome records, and notifications.
//!
//! Kept deliberately free of I/O and async so it can be unit tested in
//! isolation and reused by the ledger, notifier, executor, and dispatcher
//! crates without pulling in their transports.

mod envelope;
mod ids;
mod notification;
mod outcome;
mod rpc;
mod thread;
mod turn;

pub use envelope::{
    dedupe_key_of, normalize_thread_id, session_key_of, Envelope, EventSource, Scope, Subject,
};
pub use ids::{now_millis, IdGenerator};
pub use notification::{methods, Notification};
pub use outcome::{OutcomeRecord, OutcomeStatus};
pub use rpc::{RpcError, RpcRequest, RpcResponse};
pub use thread::{Thread, ThreadState};
pub use turn::{Turn, TurnState, TurnTransitionError};
