//! Normalizer + dedupe ledger: turns raw payloads into canonical envelopes,
//! enforces at-most-once-per-dedupe-key semantics, and provides the
//! append-only NDJSON log writer and atomic snapshot writer the dispatcher
//! builds its durable state on top of.

mod dedupe;
mod error;
mod log;
mod normalize;
mod snapshot;

pub use dedupe::{DedupeMap, DedupeSnapshot};
pub use error::LedgerError;
pub use log::AppendLog;
pub use normalize::{Normalizer, TransportHeaders};
pub use snapshot::{read_snapshot, write_snapshot};
