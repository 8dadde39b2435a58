//! The controller's state machine and its idempotent transition function.
//!
//! Push and poll both observe the same remote status shape and both go
//! through [`apply_remote`]; whichever arrives first wins, the other is a
//! no-op. Once the controller is terminal it ignores everything -- a late
//! completion after a local timeout must not resurrect the state machine.

use muse_core::job_events::JobUpdate;

/// Controller phases.
///
/// `Processing` and `Waiting` are both "busy" for UI purposes but are
/// distinct: `Waiting` means the job is queued server-side with no worker
/// running yet; `Processing` means a worker is actively on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Processing,
    Waiting,
    Completed,
    Error,
    Cancelled,
}

impl Phase {
    /// Whether the controller occupies its single submission slot.
    pub fn is_busy(self) -> bool {
        matches!(self, Phase::Uploading | Phase::Processing | Phase::Waiting)
    }

    /// Whether no further transitions can occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Error | Phase::Cancelled)
    }
}

/// Apply an observed remote job status to the current phase.
///
/// Pure and idempotent: returns the new phase when the observation moves
/// the machine, `None` when it must be ignored (already seen, out of
/// order, or the controller is no longer listening).
pub fn apply_remote(phase: Phase, update: &JobUpdate) -> Option<Phase> {
    // Terminal controllers have unsubscribed; Idle/Uploading have no
    // server-side job to hear about yet.
    if phase.is_terminal() || matches!(phase, Phase::Idle | Phase::Uploading) {
        return None;
    }

    match update.status.as_str() {
        // Queued observations carry position refreshes, not a phase move.
        "queued" => None,

        "running" => match phase {
            Phase::Waiting => Some(Phase::Processing),
            _ => None,
        },

        // A genuine completion always carries the output location.
        "completed" => update.output_url.is_some().then_some(Phase::Completed),

        "failed" => Some(Phase::Error),

        // Server-side cancellation (user action from another tab, or the
        // session reaper) only makes sense while queued.
        "cancelled" => match phase {
            Phase::Waiting => Some(Phase::Cancelled),
            _ => None,
        },

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muse_core::JobKind;

    fn update(status: &str, output: Option<&str>) -> JobUpdate {
        JobUpdate {
            job_id: 1,
            kind: JobKind::Upscale,
            status: status.to_string(),
            position: None,
            output_url: output.map(str::to_string),
            error_code: None,
            error_message: None,
        }
    }

    #[test]
    fn waiting_moves_to_processing_on_running() {
        assert_eq!(
            apply_remote(Phase::Waiting, &update("running", None)),
            Some(Phase::Processing)
        );
    }

    #[test]
    fn running_observation_is_idempotent() {
        assert_eq!(apply_remote(Phase::Processing, &update("running", None)), None);
    }

    #[test]
    fn completion_requires_output_url() {
        assert_eq!(
            apply_remote(Phase::Processing, &update("completed", Some("u"))),
            Some(Phase::Completed)
        );
        assert_eq!(apply_remote(Phase::Processing, &update("completed", None)), None);
    }

    #[test]
    fn duplicate_terminal_observation_is_ignored() {
        assert_eq!(
            apply_remote(Phase::Completed, &update("completed", Some("u"))),
            None
        );
        assert_eq!(apply_remote(Phase::Error, &update("failed", None)), None);
    }

    #[test]
    fn late_completion_after_local_error_is_discarded() {
        // The timeout path parks the controller in Error; a legitimate
        // completion arriving afterwards must not flip it to Completed.
        assert_eq!(
            apply_remote(Phase::Error, &update("completed", Some("u"))),
            None
        );
    }

    #[test]
    fn failure_is_observable_from_waiting_and_processing() {
        assert_eq!(
            apply_remote(Phase::Waiting, &update("failed", None)),
            Some(Phase::Error)
        );
        assert_eq!(
            apply_remote(Phase::Processing, &update("failed", None)),
            Some(Phase::Error)
        );
    }

    #[test]
    fn cancellation_only_applies_while_waiting() {
        assert_eq!(
            apply_remote(Phase::Waiting, &update("cancelled", None)),
            Some(Phase::Cancelled)
        );
        assert_eq!(apply_remote(Phase::Processing, &update("cancelled", None)), None);
    }

    #[test]
    fn observations_before_submission_are_ignored() {
        assert_eq!(apply_remote(Phase::Idle, &update("running", None)), None);
        assert_eq!(apply_remote(Phase::Uploading, &update("failed", None)), None);
    }
}
