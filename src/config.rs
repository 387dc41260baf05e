//! Configuration for the daybreak routine.
//!
//! Configuration sources (highest priority first):
//! 1. `--config <path>` on the command line
//! 2. `DAYBREAK_CONFIG` environment variable
//! 3. `.daybreak/config.yaml` in the current directory or any parent
//! 4. `<user config dir>/daybreak/config.yaml`
//! 5. Built-in defaults (canonical routine, 07:00 UTC, echo adapters)
//!
//! `DAYBREAK_AT` and `DAYBREAK_TIMEZONE` override the schedule from any
//! source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::{AdapterSet, AdapterSpec, EchoConfig};
use crate::core::registry::canonical_steps;
use crate::core::{AdapterKind, RegistryError, Schedule, StepDescriptor, StepRegistry};
use crate::notify::NotifyConfig;

/// Directory searched for in the current directory and its parents
pub const CONFIG_DIR_NAME: &str = ".daybreak";
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Omitted means the canonical six-step routine
    #[serde(default)]
    pub steps: Option<Vec<StepDescriptor>>,
    #[serde(default)]
    pub adapters: BTreeMap<AdapterKind, AdapterSpec>,
    #[serde(default)]
    pub notify: NotifyConfig,
}

fn default_version() -> String {
    "1".to_string()
}

impl ConfigFile {
    /// Parse a config file from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config YAML")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local fire time, "HH:MM"
    #[serde(default = "default_at")]
    pub at: String,
    /// IANA time zone name
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_at() -> String {
    "07:00".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            at: default_at(),
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Timeout for steps without their own (default: 60)
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,
    /// Wind-down time for a timed-out step (default: 250)
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,
    /// Longest scheduler sleep between wall-clock checks (default: 60)
    #[serde(default = "default_max_nap")]
    pub max_nap_seconds: u64,
}

fn default_step_timeout() -> u64 {
    60
}
fn default_grace_period() -> u64 {
    250
}
fn default_max_nap() -> u64 {
    60
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            step_timeout_seconds: default_step_timeout(),
            grace_period_ms: default_grace_period(),
            max_nap_seconds: default_max_nap(),
        }
    }
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to config file (if one was used)
    pub config_file: Option<PathBuf>,
    pub schedule: Schedule,
    pub steps: Vec<StepDescriptor>,
    pub step_timeout: Duration,
    pub grace_period: Duration,
    pub max_nap: Duration,
    pub adapters: BTreeMap<AdapterKind, AdapterSpec>,
    pub notify: NotifyConfig,
}

impl ResolvedConfig {
    /// Resolve a parsed config file, applying environment overrides
    pub fn from_file(file: ConfigFile, config_file: Option<PathBuf>) -> Result<Self> {
        let at = std::env::var("DAYBREAK_AT").unwrap_or(file.schedule.at);
        let timezone = std::env::var("DAYBREAK_TIMEZONE").unwrap_or(file.schedule.timezone);
        let schedule = Schedule::parse(&at, &timezone).context("Invalid schedule")?;

        Ok(Self {
            config_file,
            schedule,
            steps: file.steps.unwrap_or_else(canonical_steps),
            step_timeout: Duration::from_secs(file.defaults.step_timeout_seconds),
            grace_period: Duration::from_millis(file.defaults.grace_period_ms),
            max_nap: Duration::from_secs(file.defaults.max_nap_seconds),
            adapters: file.adapters,
            notify: file.notify,
        })
    }

    /// Build and validate the step registry
    pub fn registry(&self) -> Result<StepRegistry, RegistryError> {
        StepRegistry::with_default_timeout(self.steps.clone(), self.step_timeout)
    }

    /// Instantiate adapters for every capability the registry uses.
    ///
    /// Capabilities without a binding fall back to an echo adapter.
    pub fn adapter_set(&self, registry: &StepRegistry) -> Result<AdapterSet> {
        let mut set = AdapterSet::new();
        for kind in registry.required_adapters() {
            let spec = match self.adapters.get(&kind) {
                Some(spec) => spec.clone(),
                None => {
                    warn!(adapter = %kind, "No adapter configured, using echo placeholder");
                    default_adapter_spec(kind)
                }
            };
            let adapter = spec
                .build(kind)
                .with_context(|| format!("Failed to build '{}' adapter", kind))?;
            set.insert(kind, adapter);
        }
        Ok(set)
    }
}

/// Placeholder binding used when a capability is not configured
pub fn default_adapter_spec(kind: AdapterKind) -> AdapterSpec {
    let message = match kind {
        AdapterKind::Alarm => "Alarm sounded successfully.",
        AdapterKind::NewsFetch => "No news source configured for: {input}",
        AdapterKind::Summarize => "{input}",
        AdapterKind::Calendar => "No calendar configured.",
        AdapterKind::Tasks => "No task list configured.",
        AdapterKind::Music => "Music started with: {input}",
    };
    AdapterSpec::Echo(EchoConfig {
        message: message.to_string(),
    })
}

/// Find config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    ConfigFile::from_yaml(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Locate the config file following the documented precedence
fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("DAYBREAK_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    if let Some(found) = std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file(&cwd))
    {
        return Some(found);
    }

    dirs::config_dir()
        .map(|dir| dir.join("daybreak").join(CONFIG_FILE_NAME))
        .filter(|path| path.exists())
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    match locate_config_file(explicit) {
        Some(path) => {
            debug!(path = %path.display(), "Loading config file");
            let file = load_config_file(&path)?;
            ResolvedConfig::from_file(file, Some(path))
        }
        None => {
            debug!("No config file found, using defaults");
            ResolvedConfig::from_file(ConfigFile::default(), None)
        }
    }
}

/// Everything needed to run the routine, built from configuration
pub struct Runtime {
    pub config: ResolvedConfig,
    pub registry: Arc<StepRegistry>,
    pub orchestrator: Arc<crate::core::Orchestrator>,
}

impl Runtime {
    /// Validate configuration and wire up the engine.
    ///
    /// Any error here is a configuration error: the scheduler must not
    /// start.
    pub fn build(config: ResolvedConfig) -> Result<Self> {
        let registry = config.registry().context("Invalid routine definition")?;
        let adapters = config.adapter_set(&registry)?;
        let orchestrator =
            crate::core::Orchestrator::new(adapters).with_grace_period(config.grace_period);
        orchestrator
            .check_bindings(&registry)
            .context("Invalid adapter bindings")?;

        Ok(Self {
            config,
            registry: Arc::new(registry),
            orchestrator: Arc::new(orchestrator),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = ResolvedConfig::from_file(ConfigFile::default(), None).unwrap();

        assert_eq!(config.steps.len(), 6);
        assert_eq!(config.step_timeout, Duration::from_secs(60));
        assert_eq!(config.grace_period, Duration::from_millis(250));
        assert!(config.notify.console);
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1"
schedule:
  at: "06:45"
  timezone: America/New_York
defaults:
  step_timeout_seconds: 30
steps:
  - name: news_fetch
    adapter: news_fetch
    input: politics
  - name: summarize
    adapter: summarize
    depends_on: [news_fetch]
    input_from: news_fetch
adapters:
  summarize:
    type: command
    program: fabric
    args: ["-p", "summarize"]
notify:
  console: false
  log: true
"#
        )
        .unwrap();

        let file = load_config_file(&config_path).unwrap();
        assert_eq!(file.version, "1");
        assert_eq!(file.schedule.at, "06:45");
        assert_eq!(file.defaults.step_timeout_seconds, 30);
        assert_eq!(file.defaults.grace_period_ms, 250);
        assert!(matches!(
            file.adapters.get(&AdapterKind::Summarize),
            Some(AdapterSpec::Command(_))
        ));

        let steps = file.steps.clone().unwrap();
        assert_eq!(steps.len(), 2);
        assert!(!file.notify.console);
        assert!(file.notify.log);
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), "version: \"1\"\n").unwrap();

        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_file(&nested),
            Some(config_dir.join(CONFIG_FILE_NAME))
        );
    }

    #[test]
    fn test_missing_bindings_fall_back_to_echo() {
        let config = ResolvedConfig::from_file(ConfigFile::default(), None).unwrap();
        let registry = config.registry().unwrap();
        let adapters = config.adapter_set(&registry).unwrap();

        assert_eq!(adapters.kinds(), AdapterKind::ALL.to_vec());
    }

    #[test]
    fn test_cyclic_steps_fail_runtime_build() {
        let file = ConfigFile::from_yaml(
            r#"
steps:
  - { name: a, adapter: alarm, depends_on: [b] }
  - { name: b, adapter: music, depends_on: [a] }
"#,
        )
        .unwrap();
        let config = ResolvedConfig::from_file(file, None).unwrap();

        let err = Runtime::build(config).err().unwrap();
        assert!(format!("{:#}", err).contains("Dependency cycle"));
    }
}
