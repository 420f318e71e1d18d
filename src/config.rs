use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::orchestration::escalation::EscalationPolicy;
use crate::orchestration::plan::DEFAULT_MAX_CONCURRENCY;
use crate::orchestration::scheduler::{Gating, Granularity, DEFAULT_MAX_RETRIES};
use crate::{Error, Result};

/// How the orchestrator walks the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Dispatch every eligible group as a wave and await the whole wave
    /// before scheduling again.
    #[default]
    LevelByLevel,
    /// Keep up to `concurrency` groups in flight, react to whichever
    /// finishes first.
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub task_timeout_secs: u64,
    pub gating: Gating,
    pub strategy: Strategy,
    pub granularity: Granularity,
    pub escalate_on_exhausted_retries: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 1000,
            task_timeout_secs: 600,
            gating: Gating::default(),
            strategy: Strategy::default(),
            granularity: Granularity::default(),
            escalate_on_exhausted_retries: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub report_dir: Option<String>,
    pub trace_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub escalation: EscalationPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn conductor_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".conductor"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::conductor_dir()?.join("conductor.toml"))
    }

    pub fn reports_dir(&self) -> Result<PathBuf> {
        match &self.storage.report_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::conductor_dir()?.join("reports")),
        }
    }

    pub fn traces_dir(&self) -> Result<PathBuf> {
        match &self.storage.trace_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(Self::conductor_dir()?.join("traces")),
        }
    }

    /// Load `~/.conductor/conductor.toml`, or defaults if it is absent.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        debug!(
            max_concurrency = config.orchestrator.max_concurrency,
            max_retries = config.orchestrator.max_retries,
            strategy = ?config.orchestrator.strategy,
            gating = ?config.orchestrator.gating,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                debug!(dir = %dir.display(), "Creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Create the conductor, report and trace directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [Self::conductor_dir()?, self.reports_dir()?, self.traces_dir()?] {
            if !dir.exists() {
                debug!(dir = %dir.display(), "Creating directory");
                fs::create_dir_all(&dir)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrency == 0 {
            return Err(Error::Validation(
                "orchestrator.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.orchestrator.task_timeout_secs == 0 {
            return Err(Error::Validation(
                "orchestrator.task_timeout_secs must be at least 1".to_string(),
            ));
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
