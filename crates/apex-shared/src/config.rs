//! Layered kernel configuration: defaults → `apex.toml` → `APEX_*`
//! environment variables, built with the `config` crate.
//!
//! This covers only the orchestration kernel's own settings (store
//! path, concurrency caps, timeouts, retry bounds, checkpoint
//! cadence). Project-configuration file loading (tech stack,
//! feature flags for a *target* project) is explicitly out of scope
//! per spec §1 and is not modeled here.

use serde::{Deserialize, Serialize};

/// Top-level kernel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApexConfig {
    pub store: StoreConfig,
    pub concurrency: ConcurrencyConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub recovery: RecoveryConfig,
    /// Fraction of the task graph that must be complete, with no active
    /// tasks, before the Orchestrator enters IDLE (spec §9, Open
    /// Question a).
    pub completion_threshold: f64,
}

impl Default for ApexConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            recovery: RecoveryConfig::default(),
            completion_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory containing the embedded store file.
    pub path: String,
    /// Advisory size hint for the backing store (bytes).
    pub map_size_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "./apex-data".to_string(),
            map_size_bytes: 1 << 30, // 1 GiB
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_workers: u32,
    pub max_utilities: u32,
    pub restart_monitor_tick_seconds: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            max_utilities: 5,
            restart_monitor_tick_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub worker_seconds: u64,
    pub utility_seconds: u64,
    pub terminate_grace_seconds: u64,
    pub stage_timeout_minutes: u64,
    pub watch_poll_cap_millis: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            worker_seconds: 1800,
            utility_seconds: 600,
            terminate_grace_seconds: 5,
            stage_timeout_minutes: 60,
            watch_poll_cap_millis: 2000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_task_retries: u32,
    pub max_ticks_per_orchestration: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_task_retries: 2,
            max_ticks_per_orchestration: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub checkpoint_interval_minutes: u64,
    pub auto_recovery_failure_threshold: u32,
    pub keep_checkpoints: u32,
    pub keep_checkpoints_younger_than_days: u32,
    pub cleanup_completed_after_days: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval_minutes: 30,
            auto_recovery_failure_threshold: 3,
            keep_checkpoints: 10,
            keep_checkpoints_younger_than_days: 30,
            cleanup_completed_after_days: 30,
        }
    }
}

impl ApexConfig {
    /// Load configuration from defaults, an optional `apex.toml` at
    /// `config_path`, then `APEX_*` environment variable overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("APEX")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = ApexConfig::default();
        assert_eq!(cfg.concurrency.max_workers, 3);
        assert_eq!(cfg.concurrency.max_utilities, 5);
        assert_eq!(cfg.timeouts.worker_seconds, 1800);
        assert_eq!(cfg.timeouts.utility_seconds, 600);
        assert_eq!(cfg.retry.max_task_retries, 2);
        assert_eq!(cfg.retry.max_ticks_per_orchestration, 20);
        assert_eq!(cfg.recovery.checkpoint_interval_minutes, 30);
        assert_eq!(cfg.recovery.keep_checkpoints, 10);
        assert!((cfg.completion_threshold - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let cfg = ApexConfig::load(None).expect("defaults should always load");
        assert_eq!(cfg.concurrency.max_workers, 3);
    }

    #[test]
    fn environment_override_wins() {
        std::env::set_var("APEX__CONCURRENCY__MAX_WORKERS", "7");
        let cfg = ApexConfig::load(None).expect("config should load with env override");
        std::env::remove_var("APEX__CONCURRENCY__MAX_WORKERS");
        assert_eq!(cfg.concurrency.max_workers, 7);
    }
}
