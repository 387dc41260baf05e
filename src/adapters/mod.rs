//! Adapter interfaces for external capabilities.
//!
//! Adapters provide a unified interface for the routine's integrations
//! (alarm, news, summarizer, calendar, tasks, music). The orchestrator only
//! sees the [`Adapter`] trait; concrete transports live in submodules.

pub mod command;
pub mod echo;
pub mod http;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::AdapterKind;
use crate::domain::Payload;

pub use command::{CommandAdapter, CommandConfig};
pub use echo::{EchoAdapter, EchoConfig};
pub use http::{HttpAdapter, HttpConfig, HttpMethod};

/// Placeholder replaced with the step input in adapter templates
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Everything an adapter gets to see for one invocation
#[derive(Clone)]
pub struct StepContext {
    /// Run this invocation belongs to
    pub run_id: Uuid,

    /// Name of the step being executed
    pub step_name: String,

    /// Resolved input text (static input, or the output of `input_from`)
    pub input: String,

    /// Payloads of the step's dependencies, keyed by step name
    pub upstream: BTreeMap<String, Payload>,

    /// Signalled when the orchestrator stops waiting for this step
    pub cancellation_token: CancellationToken,
}

impl StepContext {
    pub fn new(run_id: Uuid, step_name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            run_id,
            step_name: step_name.into(),
            input: input.into(),
            upstream: BTreeMap::new(),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Check if the invocation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Completes when cancellation is requested
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }
}

impl std::fmt::Debug for StepContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("run_id", &self.run_id)
            .field("step_name", &self.step_name)
            .field("input_len", &self.input.len())
            .field("upstream", &self.upstream.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Trait for external adapters
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable adapter name
    fn name(&self) -> &str;

    /// Perform the capability for one step
    async fn invoke(&self, ctx: StepContext) -> Result<Payload>;

    /// Cheap reachability check
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Substitute the step input into a template
pub fn fill_input(template: &str, input: &str) -> String {
    template.replace(INPUT_PLACEHOLDER, input)
}

/// Adapter binding as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterSpec {
    /// Call an HTTP endpoint
    Http(HttpConfig),

    /// Run a local program
    Command(CommandConfig),

    /// Log and return a fixed message
    Echo(EchoConfig),
}

impl AdapterSpec {
    /// Instantiate the adapter described by this binding
    pub fn build(&self, kind: AdapterKind) -> Result<Arc<dyn Adapter>> {
        let adapter: Arc<dyn Adapter> = match self {
            Self::Http(config) => Arc::new(HttpAdapter::new(kind.as_str(), config.clone())?),
            Self::Command(config) => Arc::new(CommandAdapter::new(kind.as_str(), config.clone())),
            Self::Echo(config) => Arc::new(EchoAdapter::new(kind.as_str(), config.clone())),
        };
        Ok(adapter)
    }
}

/// Adapters available to a run, one per capability
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<AdapterKind, Arc<dyn Adapter>>,
}

impl AdapterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an adapter to a capability, replacing any previous binding
    pub fn insert(&mut self, kind: AdapterKind, adapter: Arc<dyn Adapter>) {
        self.adapters.insert(kind, adapter);
    }

    /// Builder form of [`AdapterSet::insert`]
    pub fn with(mut self, kind: AdapterKind, adapter: Arc<dyn Adapter>) -> Self {
        self.insert(kind, adapter);
        self
    }

    pub fn get(&self, kind: AdapterKind) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn contains(&self, kind: AdapterKind) -> bool {
        self.adapters.contains_key(&kind)
    }

    /// Bound capabilities in canonical order
    pub fn kinds(&self) -> Vec<AdapterKind> {
        AdapterKind::ALL
            .iter()
            .copied()
            .filter(|k| self.adapters.contains_key(k))
            .collect()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.kinds().into_iter().map(|k| {
                let name = self.adapters[&k].name().to_string();
                (k, name)
            }))
            .finish()
    }
}
