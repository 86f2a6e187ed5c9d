//! Scheduler configuration

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Last-run cost above which an occurrence routes to the slow pool
    #[serde(rename = "slow-threshold-ms")]
    pub slow_threshold_ms: u64,

    /// Pool executing ordinary occurrences
    #[serde(rename = "normal-pool")]
    pub normal_pool: PoolConfig,

    /// Larger pool executing occurrences whose last run was slow
    #[serde(rename = "slow-pool")]
    pub slow_pool: PoolConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool implementation name; unknown names fall back to "fixed"
    pub implementation: String,

    /// Worker task count; 0 resolves to the pool's built-in default
    pub workers: usize,

    /// Submission queue capacity; a full queue pushes execution back onto
    /// the submitting task (caller-runs)
    #[serde(rename = "queue-capacity")]
    pub queue_capacity: usize,
}

fn default_slow_threshold_ms() -> u64 {
    100
}

fn default_queue_capacity() -> usize {
    10_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            slow_threshold_ms: default_slow_threshold_ms(),
            normal_pool: PoolConfig::default(),
            slow_pool: PoolConfig::default(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            implementation: "fixed".to_string(),
            workers: 0,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .tickloop.yml
        let local_config = PathBuf::from(".tickloop.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/tickloop/tickloop.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tickloop").join("tickloop.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Worker count for the normal pool (default: available cores + 1)
    pub fn normal_workers(&self) -> usize {
        resolve_workers(self.normal_pool.workers, available_cores() + 1)
    }

    /// Worker count for the slow pool (default: 5x available cores)
    pub fn slow_workers(&self) -> usize {
        resolve_workers(self.slow_pool.workers, available_cores() * 5)
    }
}

fn resolve_workers(configured: usize, fallback: usize) -> usize {
    if configured == 0 { fallback } else { configured }
}

fn available_cores() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
