use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serve_types::{methods, now_millis, Notification};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type SubscriberId = u64;

/// One subscriber's bounded outbound channel. Overflow disconnects the
/// subscriber instead of blocking the broadcaster.
pub struct Subscriber {
    id: SubscriberId,
    sender: mpsc::Sender<Notification>,
}

impl Subscriber {
    fn try_send(&self, notification: &Notification) -> bool {
        match self.sender.try_send(notification.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(subscriber_id = self.id, "dropping slow subscriber: buffer full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Default bounded buffer depth per subscriber before it's disconnected.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Broadcaster for lifecycle notifications. Subscribers are stored in a
/// mutex-guarded `Vec`; broadcasts iterate a snapshot so the lock is never
/// held during the (potentially slow) per-subscriber sends.
pub struct Notifier {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    buffer_depth: usize,
}

impl Notifier {
    pub fn new(buffer_depth: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            buffer_depth,
        }
    }

    /// Registers a new subscriber and immediately sends a synthetic
    /// `thread/started` for `main`. No historical replay otherwise.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(self.buffer_depth);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let synthetic = Notification::new(
            methods::THREAD_STARTED,
            serde_json::json!({
                "thread_id": "main",
                "session_id": "main",
                "started_at": now_millis(),
                "synthetic": true,
            }),
        );
        // The channel was just created so this can only fail if the
        // receiver was already dropped, which cannot happen yet.
        let _ = tx.try_send(synthetic);

        self.subscribers
            .lock()
            .expect("subscriber list mutex poisoned")
            .push(Subscriber { id, sender: tx });
        debug!(subscriber_id = id, "subscriber connected");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers
            .lock()
            .expect("subscriber list mutex poisoned")
            .retain(|s| s.id != id);
    }

    /// Broadcasts a notification to every active subscriber in the same
    /// monotonic order. Disconnected/overflowing subscribers are dropped.
    pub fn broadcast(&self, notification: Notification) {
        let snapshot: Vec<SubscriberId> = {
            let guard = self.subscribers.lock().expect("subscriber list mutex poisoned");
            guard.iter().map(|s| s.id).collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let mut dead = Vec::new();
        {
            let guard = self.subscribers.lock().expect("subscriber list mutex poisoned");
            for subscriber in guard.iter() {
                if !subscriber.try_send(&notification) {
                    dead.push(subscriber.id);
                }
            }
        }
        if !dead.is_empty() {
            let mut guard = self.subscribers.lock().expect("subscriber list mutex poisoned");
            guard.retain(|s| !dead.contains(&s.id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("subscriber list mutex poisoned").len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_synthetic_thread_started_on_connect() {
        let notifier = Notifier::new(4);
        let (_id, mut rx) = notifier.subscribe();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.method, methods::THREAD_STARTED);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers_in_order() {
        let notifier = Notifier::new(4);
        let (_a, mut rx_a) = notifier.subscribe();
        let (_b, mut rx_b) = notifier.subscribe();
        let _ = rx_a.recv().await;
        let _ = rx_b.recv().await;

        notifier.broadcast(Notification::new(methods::TURN_STARTED, serde_json::json!({"turn_id": "U1"})));
        notifier.broadcast(Notification::new(methods::TURN_COMPLETED, serde_json::json!({"turn_id": "U1"})));

        assert_eq!(rx_a.recv().await.unwrap().method, methods::TURN_STARTED);
        assert_eq!(rx_a.recv().await.unwrap().method, methods::TURN_COMPLETED);
        assert_eq!(rx_b.recv().await.unwrap().method, methods::TURN_STARTED);
        assert_eq!(rx_b.recv().await.unwrap().method, methods::TURN_COMPLETED);
    }

    #[tokio::test]
    async fn slow_subscriber_is_disconnected_without_blocking_others() {
        let notifier = Notifier::new(1);
        let (_slow_id, mut slow_rx) = notifier.subscribe();
        let (_fast_id, mut fast_rx) = notifier.subscribe();
        let _ = slow_rx.recv().await;
        let _ = fast_rx.recv().await;

        // Fill the slow subscriber's buffer (depth 1) without draining it.
        for i in 0..3 {
            notifier.broadcast(Notification::new(
                methods::TURN_PROGRESS,
                serde_json::json!({"i": i}),
            ));
        }

        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(fast_rx.recv().await.unwrap().method, methods::TURN_PROGRESS);
    }
}
