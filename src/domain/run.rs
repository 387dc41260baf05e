//! Routine run state.
//!
//! A RoutineRun represents a single scheduled firing of the routine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::{StepResult, StepStatus};

/// Aggregate outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// Every step succeeded
    AllSucceeded,

    /// Some but not all steps succeeded
    PartialFailure,

    /// No step succeeded
    TotalFailure,
}

impl OverallStatus {
    /// Derive the overall status from step statuses
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a StepStatus>) -> Self {
        let mut total = 0usize;
        let mut succeeded = 0usize;
        for status in statuses {
            total += 1;
            if status.is_success() {
                succeeded += 1;
            }
        }

        if total > 0 && succeeded == total {
            Self::AllSucceeded
        } else if succeeded == 0 {
            Self::TotalFailure
        } else {
            Self::PartialFailure
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AllSucceeded => "all_succeeded",
            Self::PartialFailure => "partial_failure",
            Self::TotalFailure => "total_failure",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One firing of the routine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutineRun {
    /// Unique identifier for this run
    pub id: Uuid,

    /// When the run was triggered
    pub triggered_at: DateTime<Utc>,

    /// When the last step reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Step results in completion order
    pub results: Vec<StepResult>,

    /// Derived once the run is finalized
    pub overall_status: OverallStatus,
}

impl RoutineRun {
    /// Start a new run
    pub fn new(id: Uuid, triggered_at: DateTime<Utc>) -> Self {
        Self {
            id,
            triggered_at,
            finished_at: None,
            results: Vec::new(),
            overall_status: OverallStatus::TotalFailure,
        }
    }

    /// Append a terminal step result
    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
    }

    /// Compute the overall status and stamp the finish time
    pub fn finalize(mut self) -> Self {
        self.overall_status = OverallStatus::from_statuses(self.results.iter().map(|r| &r.status));
        self.finished_at = Some(Utc::now());
        self
    }

    /// Look up a step result by name
    pub fn result(&self, step_name: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.step_name == step_name)
    }

    /// Status of a step, if it was recorded
    pub fn status_of(&self, step_name: &str) -> Option<StepStatus> {
        self.result(step_name).map(|r| r.status)
    }

    /// Number of successful steps
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_success()).count()
    }

    /// Check if the run has been finalized
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::step::{Payload, StepError};

    fn ok(name: &str, position: usize) -> StepResult {
        let now = Utc::now();
        StepResult::success(name, position, Payload::text("ok"), now, now)
    }

    fn failed(name: &str, position: usize) -> StepResult {
        StepResult::skipped(name, position, StepError::Disabled)
    }

    #[test]
    fn test_run_creation() {
        let run_id = Uuid::new_v4();
        let run = RoutineRun::new(run_id, Utc::now());

        assert_eq!(run.id, run_id);
        assert!(!run.is_finished());
        assert!(run.results.is_empty());
    }

    #[test]
    fn test_overall_status_derivation() {
        let mut run = RoutineRun::new(Uuid::new_v4(), Utc::now());
        run.record(ok("a", 0));
        run.record(ok("b", 1));
        assert_eq!(run.finalize().overall_status, OverallStatus::AllSucceeded);

        let mut run = RoutineRun::new(Uuid::new_v4(), Utc::now());
        run.record(ok("a", 0));
        run.record(failed("b", 1));
        let run = run.finalize();
        assert_eq!(run.overall_status, OverallStatus::PartialFailure);
        assert_eq!(run.succeeded(), 1);

        let mut run = RoutineRun::new(Uuid::new_v4(), Utc::now());
        run.record(failed("a", 0));
        assert_eq!(run.finalize().overall_status, OverallStatus::TotalFailure);
    }

    #[test]
    fn test_empty_run_is_total_failure() {
        let run = RoutineRun::new(Uuid::new_v4(), Utc::now()).finalize();
        assert_eq!(run.overall_status, OverallStatus::TotalFailure);
        assert!(run.is_finished());
    }

    #[test]
    fn test_status_lookup() {
        let mut run = RoutineRun::new(Uuid::new_v4(), Utc::now());
        run.record(failed("music", 5));

        assert_eq!(run.status_of("music"), Some(StepStatus::Skipped));
        assert_eq!(run.status_of("alarm"), None);
    }
}
