//! Step outcome types.
//!
//! A [`StepResult`] is the terminal record for one step within one run.
//! It is created exactly once by the orchestrator and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Adapter returned a payload within the timeout
    Success,

    /// Adapter reported an error (or panicked)
    Failed,

    /// Never invoked: disabled, or a dependency did not succeed
    Skipped,

    /// Adapter did not finish within the step timeout
    TimedOut,
}

impl StepStatus {
    /// Short lowercase label used in summaries and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a step did not succeed.
///
/// These are always recorded inside a [`StepResult`]; none of them escapes
/// the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StepError {
    #[error("{message}")]
    Invocation { message: String },

    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("dependency '{dependency}' did not succeed ({status})")]
    DependencyNotSatisfied {
        dependency: String,
        status: StepStatus,
    },

    #[error("step disabled")]
    Disabled,
}

impl StepError {
    /// The status a step ends in when it carries this error
    pub fn status(&self) -> StepStatus {
        match self {
            Self::Invocation { .. } => StepStatus::Failed,
            Self::Timeout { .. } => StepStatus::TimedOut,
            Self::DependencyNotSatisfied { .. } | Self::Disabled => StepStatus::Skipped,
        }
    }
}

/// Opaque output of an adapter invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Textual form, fed to downstream steps via `input_from`
    pub text: String,

    /// Structured form when the provider returned JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Payload {
    /// Create a text-only payload
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    /// Attach structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Terminal outcome of one step within one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Step name (unique within the registry)
    pub step_name: String,

    /// Index of the step in registry declaration order
    pub position: usize,

    pub status: StepStatus,

    /// Present iff status is Success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,

    /// Present iff status is not Success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    /// A successful step
    pub fn success(
        step_name: impl Into<String>,
        position: usize,
        output: Payload,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            position,
            status: StepStatus::Success,
            output: Some(output),
            error: None,
            started_at,
            finished_at,
        }
    }

    /// A step that did not succeed; the status follows from the error
    pub fn failure(
        step_name: impl Into<String>,
        position: usize,
        error: StepError,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step_name: step_name.into(),
            position,
            status: error.status(),
            output: None,
            error: Some(error),
            started_at,
            finished_at,
        }
    }

    /// A step that was never invoked
    pub fn skipped(step_name: impl Into<String>, position: usize, error: StepError) -> Self {
        let now = Utc::now();
        Self::failure(step_name, position, error, now, now)
    }

    /// Wall-clock duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
