//! Local command adapter.
//!
//! Spawns a program, pipes the step input to its stdin and returns stdout.
//! The default summarizer is `fabric -p summarize`.

use std::collections::HashMap;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{fill_input, Adapter, StepContext};
use crate::domain::Payload;

/// Configuration for [`CommandAdapter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to run (looked up on PATH)
    pub program: String,

    /// Arguments; `{input}` is replaced with the step input
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for the child
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Write the step input to stdin (default: true)
    #[serde(default = "default_true")]
    pub stdin: bool,
}

fn default_true() -> bool {
    true
}

impl CommandConfig {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
            stdin: true,
        }
    }
}

/// Adapter running a subprocess per invocation
pub struct CommandAdapter {
    name: String,
    config: CommandConfig,
}

impl CommandAdapter {
    pub fn new(name: impl Into<String>, config: CommandConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Run the program to completion.
    ///
    /// The child is killed if the returned future is dropped, which is how
    /// cancellation and timeouts reach it.
    async fn run_subprocess(&self, input: &str) -> Result<String> {
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| fill_input(a, input))
            .collect();

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .envs(&self.config.env)
            .stdin(if self.config.stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.config.program))?;

        // Feed stdin concurrently so a filter never blocks on a full stdout pipe
        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = input.as_bytes().to_vec();
            tokio::spawn(async move { stdin.write_all(&bytes).await })
        });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for '{}'", self.config.program))?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The program exited without reading all of its input
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(program = %self.config.program, "Program closed stdin early");
                }
                Ok(Err(e)) => {
                    return Err(e).with_context(|| {
                        format!("Failed to write to '{}' stdin", self.config.program)
                    })
                }
                Err(e) => anyhow::bail!("stdin writer for '{}' failed: {}", self.config.program, e),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "'{}' failed with exit code {}: {}",
                self.config.program,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout)
            .with_context(|| format!("'{}' output is not valid UTF-8", self.config.program))
    }
}

#[async_trait]
impl Adapter for CommandAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: StepContext) -> Result<Payload> {
        debug!(adapter = %self.name, program = %self.config.program, "Running command");

        tokio::select! {
            output = self.run_subprocess(&ctx.input) => {
                Ok(Payload::text(output?.trim_end().to_string()))
            }
            _ = ctx.cancelled() => {
                anyhow::bail!("'{}' cancelled", self.config.program)
            }
        }
    }

    async fn health_check(&self) -> Result<()> {
        Command::new(&self.config.program)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .with_context(|| format!("'{}' is not runnable", self.config.program))?;
        Ok(())
    }
}
