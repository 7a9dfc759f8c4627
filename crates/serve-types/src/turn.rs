use serde::{Deserialize, Serialize};

/// One user-initiated execution cycle within a thread.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Queued,
    Active,
    CancelRequested,
    Completed,
    Interrupted,
    Failed,
}

impl TurnState {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::Interrupted | TurnState::Failed
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub turn_id: String,
    pub thread_id: String,
    pub state: TurnState,
    pub started_at: i64,
    pub updated_at: i64,
    pub elapsed_ms: i64,
    pub progress_text: String,
    /// Accumulated assistant output for this turn, preserved across
    /// progress ticks so a cancelled turn can keep partial output.
    pub output: String,
}

impl Turn {
    pub fn new(turn_id: impl Into<String>, thread_id: impl Into<String>, now: i64) -> Self {
        Self {
            turn_id: turn_id.into(),
            thread_id: thread_id.into(),
            state: TurnState::Queued,
            started_at: now,
            updated_at: now,
            elapsed_ms: 0,
            progress_text: String::new(),
            output: String::new(),
        }
    }

    /// Attempts a state transition, rejecting any move out of a terminal
    /// state.
    pub fn transition(&mut self, next: TurnState, now: i64) -> Result<(), TurnTransitionError> {
        if self.state.is_terminal() {
            return Err(TurnTransitionError::AlreadyTerminal {
                turn_id: self.turn_id.clone(),
                from: self.state,
            });
        }
        self.state = next;
        self.updated_at = now;
        self.elapsed_ms = now.saturating_sub(self.started_at);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnTransitionError {
    #[error("turn `{turn_id}` is already terminal ({from:?})")]
    AlreadyTerminal { turn_id: String, from: TurnState },
}
