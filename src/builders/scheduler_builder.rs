//! Builder assembling a scheduler from configuration.

use crate::config::{DuplicateIngressPolicy, SchedulerConfig};
use crate::core::{AppResult, AuditSink, Scheduler, SchedulerEndpoint, SchedulerError};

/// Builds a [`Scheduler`] around an endpoint.
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    audit: Option<Box<dyn AuditSink>>,
}

impl SchedulerBuilder {
    /// Builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder starting from `FAIRQ_*` environment settings.
    ///
    /// # Errors
    ///
    /// See [`SchedulerConfig::from_env`].
    pub fn from_env() -> AppResult<Self> {
        Ok(Self::new().with_config(SchedulerConfig::from_env()?))
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Global in-flight targets for analysis and import.
    #[must_use]
    pub fn with_targets(mut self, analysis: usize, import: usize) -> Self {
        self.config.target_analysis = analysis;
        self.config.target_import = import;
        self
    }

    /// Cursor traversal depths for analysis and import.
    #[must_use]
    pub fn with_traversal_depths(mut self, analysis: usize, import: usize) -> Self {
        self.config.traversal_depth_analysis = analysis;
        self.config.traversal_depth_import = import;
        self
    }

    /// Duplicate ingress policy.
    #[must_use]
    pub fn with_duplicate_ingress(mut self, policy: DuplicateIngressPolicy) -> Self {
        self.config.duplicate_ingress = policy;
        self
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, sink: impl AuditSink + 'static) -> Self {
        self.audit = Some(Box::new(sink));
        self
    }

    /// Configuration the scheduler will be built with.
    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate configuration and build the scheduler.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration does not validate.
    pub fn build<E: SchedulerEndpoint>(self, endpoint: E) -> Result<Scheduler<E>, SchedulerError> {
        self.config.validate().map_err(SchedulerError::Config)?;
        let scheduler = Scheduler::new(endpoint, self.config)?;
        Ok(match self.audit {
            Some(sink) => scheduler.with_audit(sink),
            None => scheduler,
        })
    }
}
