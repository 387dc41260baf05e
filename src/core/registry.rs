//! Step registry: the declarative routine definition.
//!
//! Steps are plain data (usually loaded from YAML). Each names one adapter
//! capability and the steps it depends on. Construction validates the
//! dependency graph and partitions it into waves; the orchestrator never
//! needs to know which steps exist.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeout applied to steps that do not set their own
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// External capabilities a step can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    Alarm,
    NewsFetch,
    Summarize,
    Calendar,
    Tasks,
    Music,
}

impl AdapterKind {
    /// Every capability in canonical order
    pub const ALL: [AdapterKind; 6] = [
        Self::Alarm,
        Self::NewsFetch,
        Self::Summarize,
        Self::Calendar,
        Self::Tasks,
        Self::Music,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alarm => "alarm",
            Self::NewsFetch => "news_fetch",
            Self::Summarize => "summarize",
            Self::Calendar => "calendar",
            Self::Tasks => "tasks",
            Self::Music => "music",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single step in the routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDescriptor {
    /// Step name (unique within the registry)
    pub name: String,

    /// Capability this step invokes
    pub adapter: AdapterKind,

    /// Steps that must succeed before this one runs
    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    /// Static input handed to the adapter
    #[serde(default)]
    pub input: Option<String>,

    /// Use this dependency's output as input instead
    #[serde(default)]
    pub input_from: Option<String>,

    /// Timeout override in seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Timeout override in milliseconds (wins over `timeout_seconds`)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Disabled steps are recorded as skipped and never invoked
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl StepDescriptor {
    pub fn new(name: impl Into<String>, adapter: AdapterKind) -> Self {
        Self {
            name: name.into(),
            adapter,
            depends_on: BTreeSet::new(),
            input: None,
            input_from: None,
            timeout_seconds: None,
            timeout_ms: None,
            enabled: true,
        }
    }

    pub fn depends_on(mut self, step: impl Into<String>) -> Self {
        self.depends_on.insert(step.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Feed a dependency's output into this step (adds the dependency)
    pub fn input_from(mut self, step: impl Into<String>) -> Self {
        let step = step.into();
        self.depends_on.insert(step.clone());
        self.input_from = Some(step);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Get the effective timeout for this step
    pub fn timeout(&self, default: Duration) -> Duration {
        match (self.timeout_ms, self.timeout_seconds) {
            (Some(ms), _) => Duration::from_millis(ms),
            (None, Some(secs)) => Duration::from_secs(secs),
            (None, None) => default,
        }
    }
}

/// The six-step morning routine
pub fn canonical_steps() -> Vec<StepDescriptor> {
    vec![
        StepDescriptor::new("alarm", AdapterKind::Alarm).with_input("morning alarm"),
        StepDescriptor::new("news_fetch", AdapterKind::NewsFetch)
            .with_input("stock market, politics"),
        StepDescriptor::new("summarize", AdapterKind::Summarize).input_from("news_fetch"),
        StepDescriptor::new("calendar", AdapterKind::Calendar).with_input("today"),
        StepDescriptor::new("tasks", AdapterKind::Tasks).with_input("today"),
        StepDescriptor::new("music", AdapterKind::Music).with_input("play morning playlist"),
    ]
}

/// Invalid routine definition; fatal at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Routine must have at least one step")]
    Empty,

    #[error("Step {index} has an empty name")]
    EmptyName { index: usize },

    #[error("Duplicate step name '{name}'")]
    DuplicateName { name: String },

    #[error("Step '{step}' depends on non-existent step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Step '{step}' depends on itself")]
    SelfDependency { step: String },

    #[error("Step '{step}' takes input from '{input_from}', which is not one of its dependencies")]
    InputNotADependency { step: String, input_from: String },

    #[error("Step '{step}' has a zero timeout")]
    ZeroTimeout { step: String },

    #[error("Dependency cycle among steps: {}", steps.join(", "))]
    Cycle { steps: Vec<String> },

    #[error("Step '{step}' uses adapter '{adapter}', which is not configured")]
    MissingAdapter { step: String, adapter: AdapterKind },
}

/// Validated, ordered set of steps with precomputed waves
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<StepDescriptor>,
    default_timeout: Duration,
    /// Step indices per wave, declaration-ordered within a wave
    waves: Vec<Vec<usize>>,
}

impl StepRegistry {
    /// Validate steps using the default timeout
    pub fn new(steps: Vec<StepDescriptor>) -> Result<Self, RegistryError> {
        Self::with_default_timeout(steps, DEFAULT_STEP_TIMEOUT)
    }

    /// Validate steps; `default_timeout` applies where a step sets none
    pub fn with_default_timeout(
        steps: Vec<StepDescriptor>,
        default_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        validate(&steps, default_timeout)?;
        let waves = compute_waves(&steps)?;

        Ok(Self {
            steps,
            default_timeout,
            waves,
        })
    }

    /// The canonical six-step routine
    pub fn canonical() -> Result<Self, RegistryError> {
        Self::new(canonical_steps())
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Get a step by name
    pub fn get(&self, name: &str) -> Option<&StepDescriptor> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get the declaration index of a step by name
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Step indices grouped into waves
    pub fn waves(&self) -> &[Vec<usize>] {
        &self.waves
    }

    /// Step names grouped into waves
    pub fn wave_names(&self) -> Vec<Vec<&str>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|&i| self.steps[i].name.as_str()).collect())
            .collect()
    }

    /// Effective timeout of a step
    pub fn timeout_for(&self, step: &StepDescriptor) -> Duration {
        step.timeout(self.default_timeout)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Capabilities used by enabled steps
    pub fn required_adapters(&self) -> BTreeSet<AdapterKind> {
        self.steps
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.adapter)
            .collect()
    }

    /// Upper bound on a run's duration, ignoring grace periods
    pub fn worst_case_duration(&self) -> Duration {
        self.waves
            .iter()
            .map(|wave| {
                wave.iter()
                    .map(|&i| self.timeout_for(&self.steps[i]))
                    .max()
                    .unwrap_or_default()
            })
            .sum()
    }
}

fn validate(steps: &[StepDescriptor], default_timeout: Duration) -> Result<(), RegistryError> {
    if steps.is_empty() {
        return Err(RegistryError::Empty);
    }

    let mut seen: BTreeSet<&str> = BTreeSet::new();
    for (index, step) in steps.iter().enumerate() {
        if step.name.trim().is_empty() {
            return Err(RegistryError::EmptyName { index });
        }
        if !seen.insert(step.name.as_str()) {
            return Err(RegistryError::DuplicateName {
                name: step.name.clone(),
            });
        }
    }

    for step in steps {
        for dependency in &step.depends_on {
            if dependency == &step.name {
                return Err(RegistryError::SelfDependency {
                    step: step.name.clone(),
                });
            }
            if !seen.contains(dependency.as_str()) {
                return Err(RegistryError::UnknownDependency {
                    step: step.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        if let Some(ref input_from) = step.input_from {
            if !step.depends_on.contains(input_from) {
                return Err(RegistryError::InputNotADependency {
                    step: step.name.clone(),
                    input_from: input_from.clone(),
                });
            }
        }

        if step.timeout(default_timeout).is_zero() {
            return Err(RegistryError::ZeroTimeout {
                step: step.name.clone(),
            });
        }
    }

    Ok(())
}

/// Partition steps into dependency waves (Kahn's algorithm by rounds).
///
/// A step lands in the first round in which all of its dependencies have
/// been placed in earlier rounds. Steps left over when a round places
/// nothing are on, or downstream of, a cycle.
fn compute_waves(steps: &[StepDescriptor]) -> Result<Vec<Vec<usize>>, RegistryError> {
    let index: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();

    let mut wave_of: Vec<Option<usize>> = vec![None; steps.len()];
    let mut waves: Vec<Vec<usize>> = Vec::new();
    let mut placed = 0;

    while placed < steps.len() {
        let current = waves.len();
        let wave: Vec<usize> = (0..steps.len())
            .filter(|&i| wave_of[i].is_none())
            .filter(|&i| {
                steps[i].depends_on.iter().all(|dep| {
                    matches!(wave_of[index[dep.as_str()]], Some(w) if w < current)
                })
            })
            .collect();

        if wave.is_empty() {
            let stuck = (0..steps.len())
                .filter(|&i| wave_of[i].is_none())
                .map(|i| steps[i].name.clone())
                .collect();
            return Err(RegistryError::Cycle { steps: stuck });
        }

        for &i in &wave {
            wave_of[i] = Some(current);
        }
        placed += wave.len();
        waves.push(wave);
    }

    Ok(waves)
}
