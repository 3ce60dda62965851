use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{tlog_debug, Error, Result};

/// How to launch an external executable (classifier worker or analysis agent).
///
/// Resolution of `command` happens once here, never inside the pool:
/// an absolute path is used as-is, a relative path is tried against the
/// config base directory, and a bare name falls back to `$PATH` lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    /// Executable to run.
    pub command: String,
    /// Arguments passed on every launch.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the process (defaults to the current dir).
    pub working_dir: Option<String>,
}

impl WorkerSpec {
    /// Create a spec for a bare command with no arguments.
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    /// Resolve the command to a concrete executable path.
    ///
    /// Resolution order: absolute path, then relative to `base_dir`,
    /// then `$PATH` via `which`.
    pub fn resolve(&self, base_dir: &Path) -> Result<PathBuf> {
        let raw = expand_tilde(&self.command);
        if raw.is_absolute() {
            if raw.exists() {
                return Ok(raw);
            }
            return Err(Error::BinaryNotFound(self.command.clone()));
        }

        let relative = base_dir.join(&raw);
        if relative.exists() {
            return Ok(relative);
        }

        which::which(&self.command).map_err(|_| Error::BinaryNotFound(self.command.clone()))
    }

    /// Check whether the command resolves at all.
    pub fn is_available(&self, base_dir: &Path) -> bool {
        self.resolve(base_dir).is_ok()
    }
}

/// Circuit breaker tuning for the classifier bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub threshold: u32,
    /// Cooldown before an open breaker permits a trial call, in milliseconds.
    pub reset_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_ms: 30_000,
        }
    }
}

impl BreakerConfig {
    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.reset_ms)
    }
}

/// Bridge pool sizing and per-call budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of long-lived classifier workers.
    pub size: usize,
    /// Per-call response budget, in milliseconds. The classifier is the
    /// low-latency path, so this stays well under a second.
    pub call_timeout_ms: u64,
    /// Delay before respawning a crashed worker, in milliseconds.
    pub respawn_backoff_ms: u64,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 2,
            call_timeout_ms: 800,
            respawn_backoff_ms: 500,
            breaker: BreakerConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn respawn_backoff(&self) -> Duration {
        Duration::from_millis(self.respawn_backoff_ms)
    }
}

fn default_agent_version() -> String {
    "1.0.0".to_string()
}

fn default_agent_timeout_ms() -> u64 {
    20_000
}

/// One configured analysis agent: a one-shot job spawned fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier, unique within the roster (e.g. "safety", "consent").
    pub name: String,
    /// Semantic version reported in results.
    #[serde(default = "default_agent_version")]
    pub version: String,
    /// Executable to run.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Per-job timeout, in milliseconds. These are the high-latency,
    /// high-variance jobs, unlike the classifier.
    #[serde(default = "default_agent_timeout_ms")]
    pub timeout_ms: u64,
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Budget ceilings for the admission gate, in USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Ceiling for a single request.
    pub per_run_usd: f64,
    /// Rolling seven-day ceiling.
    pub weekly_usd: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_run_usd: 0.50,
            weekly_usd: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    /// The low-latency mood/risk classifier worker. Optional in the file;
    /// `effective_classifier()` supplies the default command.
    pub classifier: Option<WorkerSpec>,
    /// The full analysis agent roster for the fan-out path.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Directory for the date-partitioned telemetry sink.
    pub telemetry_dir: Option<String>,
}

impl Config {
    pub fn triage_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".triage"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::triage_dir()?.join("triage.toml"))
    }

    pub fn effective_classifier(&self) -> WorkerSpec {
        self.classifier
            .clone()
            .unwrap_or_else(|| WorkerSpec::new("mood-classifier"))
    }

    pub fn effective_telemetry_dir(&self) -> Result<PathBuf> {
        match &self.telemetry_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::triage_dir()?.join("telemetry")),
        }
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            tlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        tlog_debug!(
            "Config loaded: pool_size={}, agents={}, classifier={:?}",
            config.pool.size,
            config.agents.len(),
            config.classifier.as_ref().map(|c| c.command.as_str())
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let triage_dir = Self::triage_dir()?;
        if !triage_dir.exists() {
            fs::create_dir_all(&triage_dir)?;
        }
        let path = Self::config_path()?;
        fs::write(&path, toml::to_string_pretty(self)?)?;
        tlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let triage_dir = Self::triage_dir()?;
        let telemetry_dir = self.effective_telemetry_dir()?;
        if !triage_dir.exists() {
            fs::create_dir_all(&triage_dir)?;
        }
        if !telemetry_dir.exists() {
            fs::create_dir_all(&telemetry_dir)?;
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
