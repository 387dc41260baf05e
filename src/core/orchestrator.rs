//! Main orchestrator for routine execution.
//!
//! Runs the registry wave by wave. Steps inside a wave are spawned
//! concurrently, each bounded by its own timeout; every outcome (including
//! adapter errors, panics and timeouts) is captured as a [`StepResult`], so
//! `execute` always hands back a complete [`RoutineRun`].

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{AdapterSet, StepContext};
use crate::domain::{Payload, RoutineRun, StepError, StepResult, StepStatus};

use super::gate::RunGate;
use super::registry::{RegistryError, StepDescriptor, StepRegistry};

/// How long a timed-out step gets to wind down after cancellation
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(250);

/// Main routine orchestrator
pub struct Orchestrator {
    /// Adapter per capability
    adapters: AdapterSet,

    /// Wait after signalling cancellation before aborting a step task
    grace_period: Duration,

    /// Ensures a single active run
    gate: RunGate,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(adapters: AdapterSet) -> Self {
        Self {
            adapters,
            grace_period: DEFAULT_GRACE_PERIOD,
            gate: RunGate::new(),
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    pub fn gate(&self) -> &RunGate {
        &self.gate
    }

    /// Check that every enabled step has an adapter bound
    pub fn check_bindings(&self, registry: &StepRegistry) -> Result<(), RegistryError> {
        for step in registry.steps().iter().filter(|s| s.enabled) {
            if !self.adapters.contains(step.adapter) {
                return Err(RegistryError::MissingAdapter {
                    step: step.name.clone(),
                    adapter: step.adapter,
                });
            }
        }
        Ok(())
    }

    /// Execute the routine once, waiting for any active run to finish first
    pub async fn execute(&self, registry: &StepRegistry) -> RoutineRun {
        let _permit = self.gate.enter().await;
        self.run_admitted(registry).await
    }

    /// Execute unless a run is active and another is already waiting.
    ///
    /// Used by the scheduler: a fire that arrives while one run is active
    /// and another is pending is dropped.
    pub async fn execute_coalesced(&self, registry: &StepRegistry) -> Option<RoutineRun> {
        match self.gate.enter_or_coalesce().await {
            Some(_permit) => Some(self.run_admitted(registry).await),
            None => {
                warn!("A run is active and another is pending, dropping this fire");
                None
            }
        }
    }

    #[instrument(skip_all, fields(run_id = tracing::field::Empty, steps = registry.len()))]
    async fn run_admitted(&self, registry: &StepRegistry) -> RoutineRun {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(%run_id, waves = registry.waves().len(), "Starting routine run");

        let mut run = RoutineRun::new(run_id, Utc::now());

        // Cancels anything still in flight if this future is dropped
        let run_token = CancellationToken::new();
        let _cancel_on_drop = run_token.clone().drop_guard();

        let mut outcomes: HashMap<String, (StepStatus, Option<Payload>)> = HashMap::new();

        for (wave_idx, wave) in registry.waves().iter().enumerate() {
            debug!(wave = wave_idx, size = wave.len(), "Starting wave");

            let mut in_flight = FuturesUnordered::new();

            for &position in wave {
                let step = &registry.steps()[position];

                if let Some(error) = skip_reason(step, &outcomes) {
                    info!(step = %step.name, reason = %error, "Skipping step");
                    let result = StepResult::skipped(step.name.clone(), position, error);
                    outcomes.insert(step.name.clone(), (result.status, None));
                    run.record(result);
                    continue;
                }

                let ctx = build_context(run_id, step, &outcomes, run_token.child_token());
                let timeout = registry.timeout_for(step);
                in_flight.push(self.run_step(step, position, ctx, timeout));
            }

            while let Some(result) = in_flight.next().await {
                outcomes.insert(
                    result.step_name.clone(),
                    (result.status, result.output.clone()),
                );
                run.record(result);
            }
        }

        let run = run.finalize();
        info!(
            %run_id,
            status = %run.overall_status,
            succeeded = run.succeeded(),
            total = run.results.len(),
            "Routine run finished"
        );
        run
    }

    /// Invoke one step's adapter under its timeout
    async fn run_step(
        &self,
        step: &StepDescriptor,
        position: usize,
        ctx: StepContext,
        timeout: Duration,
    ) -> StepResult {
        let started_at = Utc::now();

        let Some(adapter) = self.adapters.get(step.adapter) else {
            error!(step = %step.name, adapter = %step.adapter, "No adapter bound");
            return StepResult::failure(
                step.name.clone(),
                position,
                StepError::Invocation {
                    message: format!("no adapter bound for '{}'", step.adapter),
                },
                started_at,
                Utc::now(),
            );
        };

        let token = ctx.cancellation_token.clone();
        let mut handle = tokio::spawn(async move { adapter.invoke(ctx).await });

        let outcome = tokio::time::timeout(timeout, &mut handle).await;
        let finished_at = Utc::now();
        let elapsed_ms = (finished_at - started_at).num_milliseconds().max(0);

        let result = match outcome {
            Ok(Ok(Ok(payload))) => {
                StepResult::success(step.name.clone(), position, payload, started_at, finished_at)
            }
            Ok(Ok(Err(e))) => StepResult::failure(
                step.name.clone(),
                position,
                StepError::Invocation {
                    message: format!("{:#}", e),
                },
                started_at,
                finished_at,
            ),
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    "adapter panicked".to_string()
                } else {
                    format!("adapter task failed: {}", join_error)
                };
                StepResult::failure(
                    step.name.clone(),
                    position,
                    StepError::Invocation { message },
                    started_at,
                    finished_at,
                )
            }
            Err(_) => {
                token.cancel();
                if tokio::time::timeout(self.grace_period, &mut handle)
                    .await
                    .is_err()
                {
                    debug!(step = %step.name, "Step ignored cancellation, aborting task");
                    handle.abort();
                }
                StepResult::failure(
                    step.name.clone(),
                    position,
                    StepError::Timeout {
                        after_ms: timeout.as_millis() as u64,
                    },
                    started_at,
                    finished_at,
                )
            }
        };

        match result.status {
            StepStatus::Success => info!(step = %step.name, elapsed_ms, "Step succeeded"),
            status => warn!(
                step = %step.name,
                %status,
                elapsed_ms,
                error = %result.error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "Step did not succeed"
            ),
        }

        result
    }
}

/// Why a step must not be invoked, if anything
fn skip_reason(
    step: &StepDescriptor,
    outcomes: &HashMap<String, (StepStatus, Option<Payload>)>,
) -> Option<StepError> {
    if !step.enabled {
        return Some(StepError::Disabled);
    }

    step.depends_on.iter().find_map(|dependency| {
        // Dependencies always sit in earlier waves, so they are recorded
        let status = outcomes
            .get(dependency)
            .map(|(status, _)| *status)
            .unwrap_or(StepStatus::Skipped);
        (!status.is_success()).then(|| StepError::DependencyNotSatisfied {
            dependency: dependency.clone(),
            status,
        })
    })
}

/// Assemble the adapter context: input resolution and upstream payloads
fn build_context(
    run_id: Uuid,
    step: &StepDescriptor,
    outcomes: &HashMap<String, (StepStatus, Option<Payload>)>,
    cancellation_token: CancellationToken,
) -> StepContext {
    let upstream: BTreeMap<String, Payload> = step
        .depends_on
        .iter()
        .filter_map(|dep| {
            outcomes
                .get(dep)
                .and_then(|(_, payload)| payload.clone())
                .map(|payload| (dep.clone(), payload))
        })
        .collect();

    let input = match &step.input_from {
        Some(source) => upstream
            .get(source)
            .map(|p| p.text.clone())
            .unwrap_or_default(),
        None => step.input.clone().unwrap_or_default(),
    };

    StepContext {
        run_id,
        step_name: step.name.clone(),
        input,
        upstream,
        cancellation_token,
    }
}
