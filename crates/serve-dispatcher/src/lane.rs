use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serve_types::Envelope;

/// One unit of work queued against a session lane: either a plain envelope
/// (timer/github-sourced) or an explicit turn start/steer carrying its own
/// `turn_id` for epoch-staleness tracking.
#[derive(Clone, Debug)]
pub struct QueuedItem {
    pub envelope: Envelope,
    pub turn_id: Option<String>,
    pub enqueued_epoch: u64,
}

struct Inner {
    queue: VecDeque<QueuedItem>,
    running: bool,
    epoch: u64,
}

/// Per-session-key FIFO lane with a single active worker: one active turn
/// per session key at a time, everything else queued in arrival order.
///
/// The queue, the `running` flag, and the epoch counter are guarded by the
/// *same* mutex so that an enqueue racing with the worker's own empty-queue
/// exit check can never both observe "queue empty, no worker" and leave the
/// new item stranded: `enqueue` and `dequeue` each take the lock once and
/// make their push/spawn or pop/exit decision atomically within it.
pub struct LaneState {
    inner: Mutex<Inner>,
    cap: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("lane queue is at capacity ({cap})")]
pub struct LaneFullError {
    pub cap: usize,
}

impl LaneState {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                running: false,
                epoch: 0,
            }),
            cap,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().expect("lane mutex poisoned").queue.len()
    }

    /// Pushes `item` onto the lane queue. Returns `true` if the caller must
    /// spawn a new worker task (no worker was running), `false` if an
    /// existing worker will pick the item up on its next iteration.
    pub fn enqueue(&self, mut item: QueuedItem) -> Result<bool, LaneFullError> {
        let mut inner = self.inner.lock().expect("lane mutex poisoned");
        if inner.queue.len() >= self.cap {
            return Err(LaneFullError { cap: self.cap });
        }
        item.enqueued_epoch = inner.epoch;
        inner.queue.push_back(item);
        if inner.running {
            Ok(false)
        } else {
            inner.running = true;
            Ok(true)
        }
    }

    /// Pops the next item. If the queue is empty, clears `running` in the
    /// same critical section so a concurrent `enqueue` either observes
    /// `running = true` (and does not spawn a duplicate worker) or happens
    /// strictly after this exit (and spawns a fresh one).
    pub fn dequeue(&self) -> Option<QueuedItem> {
        let mut inner = self.inner.lock().expect("lane mutex poisoned");
        match inner.queue.pop_front() {
            Some(item) => Some(item),
            None => {
                inner.running = false;
                None
            }
        }
    }

    /// Removes a not-yet-started queued item for `turn_id`, if present.
    /// Used when interrupting a turn that never left the queue.
    pub fn remove_queued_turn(&self, turn_id: &str) -> Option<QueuedItem> {
        let mut inner = self.inner.lock().expect("lane mutex poisoned");
        let pos = inner
            .queue
            .iter()
            .position(|item| item.turn_id.as_deref() == Some(turn_id))?;
        inner.queue.remove(pos)
    }

    /// Bumps the lane epoch, invalidating any already-dequeued-but-not-yet-
    /// executed item tagged with an older epoch.
    pub fn bump_epoch(&self) -> u64 {
        let mut inner = self.inner.lock().expect("lane mutex poisoned");
        inner.epoch += 1;
        inner.epoch
    }

    pub fn current_epoch(&self) -> u64 {
        self.inner.lock().expect("lane mutex poisoned").epoch
    }

    pub fn is_stale(&self, item_epoch: u64) -> bool {
        item_epoch < self.current_epoch()
    }
}

/// Registry of lanes keyed by session key, created lazily on first use.
pub struct LaneMap {
    lanes: Mutex<HashMap<String, Arc<LaneState>>>,
    lane_queue_cap: usize,
}

impl LaneMap {
    pub fn new(lane_queue_cap: usize) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            lane_queue_cap,
        }
    }

    pub fn get_or_create(&self, session_key: &str) -> Arc<LaneState> {
        let mut lanes = self.lanes.lock().expect("lane map mutex poisoned");
        lanes
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(LaneState::new(self.lane_queue_cap)))
            .clone()
    }

    pub fn get(&self, session_key: &str) -> Option<Arc<LaneState>> {
        self.lanes
            .lock()
            .expect("lane map mutex poisoned")
            .get(session_key)
            .cloned()
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.lock().expect("lane map mutex poisoned").len()
    }

    pub fn session_keys(&self) -> Vec<String> {
        self.lanes.lock().expect("lane map mutex poisoned").keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serve_types::{EventSource, Scope};

    fn envelope(id: &str) -> Envelope {
        Envelope {
            id: id.to_string(),
            source: EventSource::Serve,
            kind: "test".into(),
            scope: Scope::default(),
            subject: None,
            payload: serde_json::json!({}),
            received_at: 0,
            dedupe_key: format!("k-{id}"),
        }
    }

    fn item(id: &str) -> QueuedItem {
        QueuedItem {
            envelope: envelope(id),
            turn_id: None,
            enqueued_epoch: 0,
        }
    }

    #[test]
    fn first_enqueue_signals_spawn_subsequent_do_not() {
        let lane = LaneState::new(8);
        assert!(lane.enqueue(item("a")).unwrap());
        assert!(!lane.enqueue(item("b")).unwrap());
    }

    #[test]
    fn enqueue_after_drain_signals_spawn_again() {
        let lane = LaneState::new(8);
        assert!(lane.enqueue(item("a")).unwrap());
        assert!(lane.dequeue().is_some());
        assert!(lane.dequeue().is_none());
        assert!(lane.enqueue(item("b")).unwrap());
    }

    #[test]
    fn enqueue_rejects_at_capacity() {
        let lane = LaneState::new(1);
        lane.enqueue(item("a")).unwrap();
        assert!(lane.enqueue(item("b")).is_err());
    }

    #[test]
    fn remove_queued_turn_pulls_matching_item_only() {
        let lane = LaneState::new(8);
        lane.enqueue(item("a")).unwrap();
        let mut with_turn = item("b");
        with_turn.turn_id = Some("T1".into());
        lane.enqueue(with_turn).unwrap();

        let removed = lane.remove_queued_turn("T1").unwrap();
        assert_eq!(removed.envelope.id, "b");
        assert_eq!(lane.queue_len(), 1);
    }

    #[test]
    fn epoch_bump_marks_older_items_stale() {
        let lane = LaneState::new(8);
        let epoch_before = lane.current_epoch();
        lane.bump_epoch();
        assert!(lane.is_stale(epoch_before));
        assert!(!lane.is_stale(lane.current_epoch()));
    }
}
