//! Dispatcher: per-session-key lanes with a single active worker each, a
//! global concurrency semaphore, the turn/thread tables, and the wiring
//! between the ledger, notifier, and executor crates.

mod config;
mod decision;
mod dispatcher;
mod error;
mod lane;
mod status;
mod turns;

pub use config::DispatcherConfig;
pub use decision::{Decision, DecisionRecord};
pub use dispatcher::{AcceptOutcome, Dispatcher};
pub use error::DispatcherError;
pub use lane::{LaneFullError, LaneMap, LaneState, QueuedItem};
pub use status::{RunState, StatusSnapshot};
pub use turns::{TurnTable, TurnTableError};
