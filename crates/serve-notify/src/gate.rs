use std::collections::HashSet;

use serve_types::OutcomeRecord;

/// Outcome of applying the activity gate to an `OutcomeRecord`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GatingDecision {
    /// Emit an `item/created` `system_announce` notification.
    Emit,
    /// Write to `activity-ledger.ndjson` with a gating reason; no broadcast.
    Suppress,
}

/// Whether `event_type` is on the configured always-emit allowlist.
pub fn always_emit(event_type: &str, allowlist: &HashSet<String>) -> bool {
    allowlist.contains(event_type)
}

/// Applies the gating rule: emit iff `status` is terminal-bad, or an action
/// was produced, or the type is always-emit.
pub fn decide(outcome: &OutcomeRecord, type_is_always_emit: bool) -> GatingDecision {
    if outcome.passes_gate(type_is_always_emit) {
        GatingDecision::Emit
    } else {
        GatingDecision::Suppress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serve_types::OutcomeStatus;

    fn outcome(status: OutcomeStatus, has_action: bool) -> OutcomeRecord {
        OutcomeRecord {
            event_id: "e1".into(),
            status,
            has_action,
            action_refs: vec![],
            message: String::new(),
            completed_at: 0,
        }
    }

    #[test]
    fn emits_on_failure_or_interruption() {
        assert_eq!(
            decide(&outcome(OutcomeStatus::Failed, false), false),
            GatingDecision::Emit
        );
        assert_eq!(
            decide(&outcome(OutcomeStatus::Interrupted, false), false),
            GatingDecision::Emit
        );
    }

    #[test]
    fn emits_on_action_or_allowlist() {
        assert_eq!(
            decide(&outcome(OutcomeStatus::Ok, true), false),
            GatingDecision::Emit
        );
        assert_eq!(
            decide(&outcome(OutcomeStatus::Ok, false), true),
            GatingDecision::Emit
        );
    }

    #[test]
    fn suppresses_quiet_ok_outcomes() {
        assert_eq!(
            decide(&outcome(OutcomeStatus::Ok, false), false),
            GatingDecision::Suppress
        );
    }
}
