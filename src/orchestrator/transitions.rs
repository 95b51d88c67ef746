//! Legal phase transitions.

use crate::domain::RunPhase;
use crate::error::{Result, ScoutError};

/// True when a run may move from `from` to `to`.
///
/// Any live phase may fail or be cancelled; terminal phases go nowhere.
pub fn can_transition(from: RunPhase, to: RunPhase) -> bool {
    use RunPhase::*;

    if from.is_terminal() {
        return false;
    }
    if matches!(to, Failed | Cancelled) {
        return true;
    }
    matches!(
        (from, to),
        (Init, Planning)
            | (Planning, Discovering)
            | (Planning, Done)
            | (Discovering, Scoring)
            | (Discovering, Planning)
            | (Scoring, Discovering)
            | (Scoring, Planning)
            | (Scoring, Done)
    )
}

/// `InvalidState` unless the transition is in the table.
pub fn check_transition(from: RunPhase, to: RunPhase) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(ScoutError::InvalidState(format!(
            "illegal transition {} -> {}",
            from.as_str(),
            to.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunPhase::*;

    #[test]
    fn test_happy_path_is_legal() {
        for (from, to) in [
            (Init, Planning),
            (Planning, Discovering),
            (Discovering, Scoring),
            (Scoring, Discovering),
            (Scoring, Planning),
            (Scoring, Done),
        ] {
            assert!(can_transition(from, to), "{:?} -> {:?}", from, to);
        }
    }

    #[test]
    fn test_skipping_phases_is_illegal() {
        assert!(!can_transition(Init, Discovering));
        assert!(!can_transition(Init, Done));
        assert!(!can_transition(Discovering, Done));
        assert!(!can_transition(Planning, Scoring));
    }

    #[test]
    fn test_terminal_phases_are_final() {
        for terminal in [Done, Failed, Cancelled] {
            for to in [Init, Planning, Discovering, Scoring, Done, Failed, Cancelled] {
                assert!(!can_transition(terminal, to));
            }
        }
    }

    #[test]
    fn test_any_live_phase_can_fail_or_cancel() {
        for from in [Init, Planning, Discovering, Scoring] {
            assert!(can_transition(from, Failed));
            assert!(can_transition(from, Cancelled));
        }
    }

    #[test]
    fn test_check_transition_error() {
        let err = check_transition(Done, Planning).unwrap_err();
        assert!(matches!(err, ScoutError::InvalidState(_)));
        assert!(err.to_string().contains("DONE -> PLANNING"));
    }
}
