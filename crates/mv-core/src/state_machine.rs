use crate::error::StateMachineError;
use crate::types::StageStatus;

/// Validates a stage status transition.
///
/// A stage goes `idle -> running -> completed | failed`; any terminal status
/// may be re-run or skipped by a later pipeline run. With the `strict-debug`
/// feature an illegal transition panics instead of returning an error.
pub fn validate_transition(from: StageStatus, to: StageStatus) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal stage transition attempted: {:?} -> {:?}", from, to);

        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// Statuses reachable from `from`.
pub fn allowed_transitions(from: StageStatus) -> Vec<StageStatus> {
    use StageStatus::*;
    match from {
        Idle => vec![Running, Skipped],
        Running => vec![Completed, Failed],
        Completed | Failed | Skipped => vec![Running, Skipped],
    }
}

fn allowed(from: StageStatus, to: StageStatus) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}
