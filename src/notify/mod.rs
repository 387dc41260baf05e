//! Delivery of the rendered run summary.
//!
//! The engine only produces text; sinks decide where it goes. Delivery
//! failures are logged and never affect the run.

pub mod telegram;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::core::render_header;
use crate::domain::RoutineRun;

pub use telegram::{TelegramConfig, TelegramSink};

/// Destination for a rendered summary
#[async_trait]
pub trait SummarySink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, summary: &str, run: &RoutineRun) -> Result<()>;
}

/// Prints the summary to stdout
#[derive(Debug, Default)]
pub struct ConsoleSink;

#[async_trait]
impl SummarySink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, summary: &str, run: &RoutineRun) -> Result<()> {
        println!("{}\n{}", render_header(run), summary.trim_end());
        Ok(())
    }
}

/// Emits the summary as a tracing event
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl SummarySink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, summary: &str, run: &RoutineRun) -> Result<()> {
        info!(run_id = %run.id, status = %run.overall_status, "\n{}", summary.trim_end());
        Ok(())
    }
}

/// Where summaries go, as written in the config file
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NotifyConfig {
    /// Print to stdout (default: true)
    #[serde(default = "default_console")]
    pub console: bool,

    /// Also emit as a log event
    #[serde(default)]
    pub log: bool,

    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

fn default_console() -> bool {
    true
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            console: default_console(),
            log: false,
            telegram: None,
        }
    }
}

impl NotifyConfig {
    /// Instantiate the configured sinks.
    ///
    /// A sink that cannot be built (e.g. missing token) is skipped with a
    /// warning rather than stopping the process.
    pub fn build(&self) -> Vec<Arc<dyn SummarySink>> {
        let mut sinks: Vec<Arc<dyn SummarySink>> = Vec::new();
        if self.console {
            sinks.push(Arc::new(ConsoleSink));
        }
        if self.log {
            sinks.push(Arc::new(LogSink));
        }
        if let Some(ref telegram) = self.telegram {
            match TelegramSink::from_config(telegram) {
                Ok(client) => sinks.push(Arc::new(client)),
                Err(e) => warn!(error = %e, "Telegram delivery disabled"),
            }
        }
        sinks
    }
}

/// Hand the summary to every sink, logging failures
pub async fn deliver_all(sinks: &[Arc<dyn SummarySink>], summary: &str, run: &RoutineRun) {
    for sink in sinks {
        if let Err(e) = sink.deliver(summary, run).await {
            warn!(sink = sink.name(), error = %format!("{:#}", e), "Summary delivery failed");
        }
    }
}
