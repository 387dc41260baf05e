//! Command-line interface for daybreak.
//!
//! Provides commands for running the daily scheduler, running the routine
//! once, previewing fire times and validating configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{load_config, ResolvedConfig, Runtime};
use crate::core::{render, upcoming_fire_instants, Orchestrator, Scheduler, StepRegistry};
use crate::domain::{OverallStatus, RoutineRun};
use crate::notify::{deliver_all, SummarySink};

/// daybreak - Scheduled morning-routine orchestrator
#[derive(Parser, Debug)]
#[command(name = "daybreak")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (overrides DAYBREAK_CONFIG and discovery)
    #[arg(short, long, global = true, env = "DAYBREAK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the routine every day at the scheduled time
    Start,

    /// Run the routine once, now
    Run {
        /// Print the run as JSON instead of the digest
        #[arg(long)]
        json: bool,
    },

    /// Show upcoming fire times
    Next {
        /// Number of fire times to show
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,
    },

    /// Validate configuration and show execution waves
    Check {
        /// Also run adapter health checks
        #[arg(long)]
        health: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;

        match self.command {
            Commands::Start => start(config).await,
            Commands::Run { json } => run_once(config, json).await,
            Commands::Next { count } => show_next(&config, count),
            Commands::Check { health } => check(config, health).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Run the routine once and deliver its summary.
///
/// Returns `None` when the fire was coalesced behind an active run.
pub async fn fire_routine(
    orchestrator: &Orchestrator,
    registry: &StepRegistry,
    sinks: &[Arc<dyn SummarySink>],
) -> Option<RoutineRun> {
    let run = orchestrator.execute_coalesced(registry).await?;
    let summary = render(&run);
    deliver_all(sinks, &summary, &run).await;
    Some(run)
}

/// Daemon mode: fire daily until interrupted
async fn start(config: ResolvedConfig) -> Result<()> {
    // Configuration errors abort here, before any wait begins
    let runtime = Runtime::build(config)?;
    let sinks: Arc<Vec<Arc<dyn SummarySink>>> = Arc::new(runtime.config.notify.build());

    let scheduler =
        Scheduler::new(runtime.config.schedule).with_max_nap(runtime.config.max_nap);

    let orchestrator = Arc::clone(&runtime.orchestrator);
    let registry = Arc::clone(&runtime.registry);

    let routine = scheduler.run(move || {
        let orchestrator = Arc::clone(&orchestrator);
        let registry = Arc::clone(&registry);
        let sinks = Arc::clone(&sinks);
        async move {
            match fire_routine(&orchestrator, &registry, &sinks).await {
                Some(run) if run.overall_status == OverallStatus::TotalFailure => {
                    anyhow::bail!("Every step of run {} failed", run.id)
                }
                _ => Ok(()),
            }
        }
    });

    tokio::select! {
        _ = routine => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutting down");
        }
    }

    Ok(())
}

/// Run the routine once, now
async fn run_once(config: ResolvedConfig, json: bool) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let mut sinks = runtime.config.notify.build();
    if json {
        sinks.retain(|s| s.name() != "console");
    }

    let run = runtime.orchestrator.execute(&runtime.registry).await;
    deliver_all(&sinks, &render(&run), &run).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run).context("Failed to serialize run")?
        );
    }

    if run.overall_status == OverallStatus::TotalFailure {
        eprintln!("\n[Run {} failed: no step succeeded]", run.id);
        std::process::exit(1);
    }

    Ok(())
}

/// Print the next fire times in the schedule's zone
fn show_next(config: &ResolvedConfig, count: usize) -> Result<()> {
    let now = Utc::now();
    let tz = config.schedule.time_zone();

    println!("Schedule: {}", config.schedule);
    for instant in upcoming_fire_instants(now, &config.schedule, count) {
        let until = instant - now;
        println!(
            "  {}  (in {}h {:02}m)",
            instant.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"),
            until.num_hours(),
            until.num_minutes() % 60
        );
    }

    Ok(())
}

/// Validate config, print waves, optionally health-check adapters
async fn check(config: ResolvedConfig, health: bool) -> Result<()> {
    let runtime = Runtime::build(config)?;
    let registry = &runtime.registry;

    match &runtime.config.config_file {
        Some(path) => println!("Config: {}", path.display()),
        None => println!("Config: (built-in defaults)"),
    }
    println!("Schedule: {}", runtime.config.schedule);
    println!("Steps: {}", registry.len());

    for (idx, wave) in registry.waves().iter().enumerate() {
        println!("Wave {}:", idx);
        for &position in wave {
            let step = &registry.steps()[position];
            let deps = if step.depends_on.is_empty() {
                String::new()
            } else {
                format!(
                    " after {}",
                    step.depends_on.iter().cloned().collect::<Vec<_>>().join(", ")
                )
            };
            println!(
                "  {} -> {} (timeout {:?}{}){}",
                step.name,
                step.adapter,
                registry.timeout_for(step),
                if step.enabled { "" } else { ", disabled" },
                deps
            );
        }
    }
    println!(
        "Worst-case run time: {:?}",
        registry.worst_case_duration()
    );

    if health {
        let adapters = runtime.orchestrator.adapters();
        for kind in adapters.kinds() {
            let Some(adapter) = adapters.get(kind) else {
                continue;
            };
            match adapter.health_check().await {
                Ok(()) => println!("  [ok]   {}", kind),
                Err(e) => {
                    warn!(adapter = %kind, error = %e, "Health check failed");
                    println!("  [fail] {}: {:#}", kind, e);
                }
            }
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("daybreak configuration");
    println!("======================");
    println!();
    match &config.config_file {
        Some(path) => println!("Config file:  {}", path.display()),
        None => println!("Config file:  (none, using defaults)"),
    }
    println!("Schedule:     {}", config.schedule);
    println!("Step timeout: {:?}", config.step_timeout);
    println!("Grace period: {:?}", config.grace_period);
    println!("Max nap:      {:?}", config.max_nap);
    println!();
    println!("Steps:");
    print!(
        "{}",
        serde_yaml::to_string(&config.steps).context("Failed to render steps")?
    );
    println!();
    println!("Adapters:");
    if config.adapters.is_empty() {
        println!("  (none configured, echo placeholders)");
    } else {
        print!(
            "{}",
            serde_yaml::to_string(&config.adapters).context("Failed to render adapters")?
        );
    }
    println!();
    println!("Notify:");
    print!(
        "{}",
        serde_yaml::to_string(&config.notify).context("Failed to render notify")?
    );

    Ok(())
}
