//! Log-only adapter.
//!
//! Stands in for integrations that have no endpoint configured yet (the
//! alarm and music steps default to this). It logs the step input and
//! returns a fixed message.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{fill_input, Adapter, StepContext};
use crate::domain::Payload;

/// Configuration for [`EchoAdapter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoConfig {
    /// Returned text; `{input}` is replaced with the step input
    #[serde(default = "default_message")]
    pub message: String,
}

fn default_message() -> String {
    "done: {input}".to_string()
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self {
            message: default_message(),
        }
    }
}

/// Adapter that only logs
pub struct EchoAdapter {
    name: String,
    config: EchoConfig,
}

impl EchoAdapter {
    pub fn new(name: impl Into<String>, config: EchoConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Echo adapter with a fixed message
    pub fn with_message(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            name,
            EchoConfig {
                message: message.into(),
            },
        )
    }
}

#[async_trait]
impl Adapter for EchoAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: StepContext) -> Result<Payload> {
        info!(adapter = %self.name, step = %ctx.step_name, input = %ctx.input, "Echo adapter invoked");
        Ok(Payload::text(fill_input(&self.config.message, &ctx.input)))
    }
}
