//! daybreak - Scheduled morning-routine orchestrator
//!
//! Fires once a day at a configured local time and runs a fixed routine of
//! steps (alarm, news, summary, calendar, tasks, music), each delegated to
//! a pluggable adapter.
//!
//! # Architecture
//!
//! - Steps are declared as data with explicit dependencies
//! - Independent steps run concurrently in dependency waves
//! - Every step is bounded by a timeout; failures are recorded, not raised
//! - A skipped dependency propagates as Skipped downstream
//! - Each run ends in a rendered digest handed to summary sinks
//!
//! # Modules
//!
//! - `adapters`: External capability transports (HTTP, command, echo)
//! - `core`: Registry, Orchestrator, Scheduler, Summary
//! - `domain`: Data structures (StepResult, RoutineRun)
//! - `notify`: Summary sinks (console, log, Telegram)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the routine every day at the configured time
//! daybreak start
//!
//! # Run it once, right now
//! daybreak run
//!
//! # Show upcoming fire times
//! daybreak next --count 3
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod notify;

// Re-export main types at crate root for convenience
pub use adapters::{Adapter, AdapterSet, StepContext};
pub use core::{Orchestrator, Schedule, Scheduler, StepDescriptor, StepRegistry};
pub use domain::{OverallStatus, Payload, RoutineRun, StepError, StepResult, StepStatus};
