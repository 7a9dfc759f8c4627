//! Activity gating + notifier: decides UI-visibility of outcomes and fans
//! out JSON-RPC notifications to every active subscriber without letting a
//! slow subscriber block the rest. Subscribers get a bounded per-subscriber
//! buffer with disconnect-on-overflow rather than an unbounded channel.

mod gate;
mod notifier;

pub use gate::{always_emit, decide, GatingDecision};
pub use notifier::{Notifier, Subscriber, SubscriberId, DEFAULT_SUBSCRIBER_BUFFER};
