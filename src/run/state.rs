use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Passed,
    Failed,
    Cancelled,
}

/// `NotStarted → Running → Finished(outcome) → Done(outcome)`.
///
/// Once a run leaves `Running` its outcome is fixed until the next run starts, so a
/// failed run can never turn back into a passing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Finished(RunOutcome),
    Done(RunOutcome),
}

impl RunState {
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self {
            RunState::Finished(outcome) | RunState::Done(outcome) => Some(*outcome),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self.outcome(),
            Some(RunOutcome::Failed | RunOutcome::Cancelled)
        )
    }

    pub(crate) fn start(&mut self) {
        *self = RunState::Running;
    }

    /// Leave `Running` with `outcome`. Returns false if the run had already finished.
    pub(crate) fn finish(&mut self, outcome: RunOutcome) -> bool {
        if *self == RunState::Running {
            *self = RunState::Finished(outcome);
            true
        } else {
            false
        }
    }

    pub(crate) fn close(&mut self) {
        if let RunState::Finished(outcome) = *self {
            *self = RunState::Done(outcome);
        }
    }
}
