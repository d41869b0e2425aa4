//! Registry configuration

use std::time::Duration;

/// Default bus subject for remote session creation
pub const DEFAULT_CREATE_SUBJECT: &str = "channelling.session.create";

/// Default bus subject for remote session teardown
pub const DEFAULT_CLOSE_SUBJECT: &str = "channelling.session.close";

/// Configuration for the pipeline manager
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// How long a pipeline stays alive without being looked up
    pub pipeline_expiry: Duration,

    /// How often the sweeper scans for expired pipelines
    pub sweep_interval: Duration,

    /// Bus subject carrying session create requests
    pub create_subject: String,

    /// Bus subject carrying session close requests
    pub close_subject: String,

    /// Return an arbitrary pipeline when an exact id lookup misses.
    ///
    /// Only meant for local development against a single pipeline. Every
    /// fallback hit is logged at warn level.
    pub dev_pipeline_fallback: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pipeline_expiry: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(30),
            create_subject: DEFAULT_CREATE_SUBJECT.to_string(),
            close_subject: DEFAULT_CLOSE_SUBJECT.to_string(),
            dev_pipeline_fallback: false,
        }
    }
}

impl RegistryConfig {
    /// Set the pipeline expiry window
    pub fn pipeline_expiry(mut self, expiry: Duration) -> Self {
        self.pipeline_expiry = expiry;
        self
    }

    /// Set the sweep interval
    ///
    /// Zero is rejected by `tokio::time::interval`, so it is clamped to 1ms.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the session create subject
    pub fn create_subject(mut self, subject: impl Into<String>) -> Self {
        self.create_subject = subject.into();
        self
    }

    /// Set the session close subject
    pub fn close_subject(mut self, subject: impl Into<String>) -> Self {
        self.close_subject = subject.into();
        self
    }

    /// Enable the development "any pipeline" lookup fallback
    pub fn enable_dev_pipeline_fallback(mut self) -> Self {
        self.dev_pipeline_fallback = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.pipeline_expiry, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.create_subject, "channelling.session.create");
        assert_eq!(config.close_subject, "channelling.session.close");
        assert!(!config.dev_pipeline_fallback);
    }

    #[test]
    fn test_builder_sweep_interval_clamped() {
        let config = RegistryConfig::default().sweep_interval(Duration::ZERO);

        assert_eq!(config.sweep_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .pipeline_expiry(Duration::from_secs(5))
            .sweep_interval(Duration::from_secs(1))
            .create_subject("node.create")
            .close_subject("node.close")
            .enable_dev_pipeline_fallback();

        assert_eq!(config.pipeline_expiry, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.create_subject, "node.create");
        assert_eq!(config.close_subject, "node.close");
        assert!(config.dev_pipeline_fallback);
    }
}
