use std::collections::HashMap;
use std::sync::Mutex;

use serve_types::{now_millis, IdGenerator, Turn, TurnState, TurnTransitionError};

/// In-memory turn registry plus the turn-id -> event-id back-reference the
/// executor client needs for cancellation.
pub struct TurnTable {
    ids: IdGenerator,
    turns: Mutex<HashMap<String, Turn>>,
    events: Mutex<HashMap<String, String>>,
}

impl TurnTable {
    pub fn new() -> Self {
        Self {
            ids: IdGenerator::new("turn"),
            turns: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a freshly queued turn, returning its generated id.
    pub fn create(&self, thread_id: &str, event_id: &str) -> Turn {
        let turn_id = self.ids.next();
        let turn = Turn::new(turn_id.clone(), thread_id, now_millis());
        self.turns
            .lock()
            .expect("turn table mutex poisoned")
            .insert(turn_id.clone(), turn.clone());
        self.events
            .lock()
            .expect("turn events mutex poisoned")
            .insert(turn_id, event_id.to_string());
        turn
    }

    pub fn get(&self, turn_id: &str) -> Option<Turn> {
        self.turns
            .lock()
            .expect("turn table mutex poisoned")
            .get(turn_id)
            .cloned()
    }

    pub fn event_id_for(&self, turn_id: &str) -> Option<String> {
        self.events
            .lock()
            .expect("turn events mutex poisoned")
            .get(turn_id)
            .cloned()
    }

    /// Applies a state transition, rejecting moves out of a terminal state
    /// (`Turn::transition`'s invariant).
    pub fn transition(&self, turn_id: &str, next: TurnState) -> Result<Turn, TurnTableError> {
        let mut turns = self.turns.lock().expect("turn table mutex poisoned");
        let turn = turns
            .get_mut(turn_id)
            .ok_or_else(|| TurnTableError::NotFound(turn_id.to_string()))?;
        turn.transition(next, now_millis())?;
        Ok(turn.clone())
    }

    /// Records progress (text/output/elapsed) without changing `state`.
    pub fn record_progress(&self, turn_id: &str, text: &str, output_delta: &str) -> Option<Turn> {
        let mut turns = self.turns.lock().expect("turn table mutex poisoned");
        let turn = turns.get_mut(turn_id)?;
        turn.progress_text = text.to_string();
        turn.output.push_str(output_delta);
        turn.updated_at = now_millis();
        turn.elapsed_ms = turn.updated_at.saturating_sub(turn.started_at);
        Some(turn.clone())
    }
}

impl Default for TurnTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnTableError {
    #[error("turn `{0}` was not found")]
    NotFound(String),
    #[error(transparent)]
    Transition(#[from] TurnTransitionError),
}
