//! Core orchestration logic.
//!
//! This module contains:
//! - Registry: declarative step definitions and wave computation
//! - Orchestrator: wave-by-wave execution with per-step isolation
//! - Scheduler: daily wall-clock trigger
//! - Summary: run digest rendering
//! - Gate: single-active-run admission

pub mod gate;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod summary;

// Re-export commonly used types
pub use gate::RunGate;
pub use orchestrator::{Orchestrator, DEFAULT_GRACE_PERIOD};
pub use registry::{
    canonical_steps, AdapterKind, RegistryError, StepDescriptor, StepRegistry,
    DEFAULT_STEP_TIMEOUT,
};
pub use scheduler::{
    next_fire_instant, upcoming_fire_instants, Clock, Schedule, ScheduleError, Scheduler,
    SystemClock,
};
pub use summary::{render, render_header};
