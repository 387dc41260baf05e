//! Domain types for the daybreak orchestrator.
//!
//! This module contains the core data structures:
//! - Step: terminal step outcomes and adapter payloads
//! - Run: one firing of the routine

pub mod run;
pub mod step;

// Re-export commonly used types
pub use run::{OverallStatus, RoutineRun};
pub use step::{Payload, StepError, StepResult, StepStatus};
