//! Scheduler and worker configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// What to do when ingress delivers a task that is already enqueued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateIngressPolicy {
    /// Log a warning and keep the enqueued version.
    #[default]
    Tolerate,
    /// Fail the ingress with `Duplicate`.
    Reject,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Global analysis tasks in flight, summed across owners.
    pub target_analysis: usize,
    /// Global import tasks in flight, summed across owners.
    pub target_import: usize,
    /// Entries the analysis cursor may skip per cycle.
    pub traversal_depth_analysis: usize,
    /// Entries the import cursor may skip per cycle.
    pub traversal_depth_import: usize,
    /// Maximum wait for one broker event, in milliseconds.
    pub poll_interval_ms: u64,
    /// Events drained before each dispatch pass.
    pub max_events_per_cycle: usize,
    /// Interval between queue statistics log lines; 0 disables them.
    pub stats_interval_secs: u64,
    /// Duplicate ingress handling.
    pub duplicate_ingress: DuplicateIngressPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_analysis: 16,
            target_import: 16,
            traversal_depth_analysis: 50,
            traversal_depth_import: 20,
            poll_interval_ms: 50,
            max_events_per_cycle: 100,
            stats_interval_secs: 60,
            duplicate_ingress: DuplicateIngressPolicy::Tolerate,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.target_analysis == 0 {
            return Err("target_analysis must be greater than 0".into());
        }
        if self.target_import == 0 {
            return Err("target_import must be greater than 0".into());
        }
        if self.traversal_depth_analysis == 0 {
            return Err("traversal_depth_analysis must be greater than 0".into());
        }
        if self.traversal_depth_import == 0 {
            return Err("traversal_depth_import must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.max_events_per_cycle == 0 {
            return Err("max_events_per_cycle must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `FAIRQ_*` environment variables, reading a
    /// `.env` file first if one exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Fails on unparsable values or if the result does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = env_parse("FAIRQ_TARGET_ANALYSIS")? {
            cfg.target_analysis = v;
        }
        if let Some(v) = env_parse("FAIRQ_TARGET_IMPORT")? {
            cfg.target_import = v;
        }
        if let Some(v) = env_parse("FAIRQ_TRAVERSAL_DEPTH_ANALYSIS")? {
            cfg.traversal_depth_analysis = v;
        }
        if let Some(v) = env_parse("FAIRQ_TRAVERSAL_DEPTH_IMPORT")? {
            cfg.traversal_depth_import = v;
        }
        if let Some(v) = env_parse("FAIRQ_POLL_INTERVAL_MS")? {
            cfg.poll_interval_ms = v;
        }
        if let Some(v) = env_parse("FAIRQ_MAX_EVENTS_PER_CYCLE")? {
            cfg.max_events_per_cycle = v;
        }
        if let Some(v) = env_parse("FAIRQ_STATS_INTERVAL_SECS")? {
            cfg.stats_interval_secs = v;
        }
        if let Ok(raw) = std::env::var("FAIRQ_DUPLICATE_INGRESS") {
            cfg.duplicate_ingress = match raw.trim() {
                "tolerate" => DuplicateIngressPolicy::Tolerate,
                "reject" => DuplicateIngressPolicy::Reject,
                other => anyhow::bail!("FAIRQ_DUPLICATE_INGRESS: unknown policy `{other}`"),
            };
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Broker wait per event.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Statistics interval, `None` when disabled.
    #[must_use]
    pub const fn stats_interval(&self) -> Option<Duration> {
        if self.stats_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.stats_interval_secs))
        }
    }
}

/// Worker harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker threads per class.
    pub worker_count: usize,
    /// Maximum wait for one delivery, in milliseconds.
    pub poll_interval_ms: u64,
    /// Stop once resident memory reaches this many MiB.
    pub max_memory_mib: Option<u64>,
    /// Stop after running this long.
    pub max_runtime_secs: Option<u64>,
    /// Stop after handling this many tasks.
    pub max_tasks: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            poll_interval_ms: 100,
            max_memory_mib: None,
            max_runtime_secs: None,
            max_tasks: None,
        }
    }
}

impl WorkerConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the resident memory limit.
    #[must_use]
    pub const fn with_max_memory_mib(mut self, mib: u64) -> Self {
        self.max_memory_mib = Some(mib);
        self
    }

    /// Set the runtime limit.
    #[must_use]
    pub const fn with_max_runtime_secs(mut self, secs: u64) -> Self {
        self.max_runtime_secs = Some(secs);
        self
    }

    /// Set the task-count limit.
    #[must_use]
    pub const fn with_max_tasks(mut self, tasks: u64) -> Self {
        self.max_tasks = Some(tasks);
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.max_memory_mib == Some(0) {
            return Err("max_memory_mib must be greater than 0 when set".into());
        }
        if self.max_runtime_secs == Some(0) {
            return Err("max_runtime_secs must be greater than 0 when set".into());
        }
        if self.max_tasks == Some(0) {
            return Err("max_tasks must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Delivery wait.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn env_parse<T>(key: &str) -> AppResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{key}: cannot parse `{raw}`")),
        Err(_) => Ok(None),
    }
}
