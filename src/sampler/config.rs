//! Sampler configuration.

use crate::error::{LoadError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for a load sampler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Seed all-zero windows from CPU utilization when the counter reads zero
    pub zero_bootstrap: bool,
    /// Run the sampler on its own thread instead of the caller's runtime
    pub dedicated_thread: bool,
    /// Name of the dedicated sampler thread
    pub thread_name: String,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            zero_bootstrap: true,
            dedicated_thread: false,
            thread_name: "load-sampler".to_string(),
        }
    }
}

impl SamplerConfig {
    /// Enable or disable the zero reading bootstrap.
    pub fn with_zero_bootstrap(mut self, enabled: bool) -> Self {
        self.zero_bootstrap = enabled;
        self
    }

    /// Run on a dedicated thread.
    ///
    /// Without one, the sampler is spawned on the Tokio runtime of whoever
    /// first calls an accessor. When that runtime shuts down, readings keep the
    /// last snapshot and report [`LoadError::Stopped`](crate::LoadError::Stopped).
    pub fn with_dedicated_thread(mut self, dedicated: bool) -> Self {
        self.dedicated_thread = dedicated;
        self
    }

    /// Set the dedicated thread's name.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Check the configuration for values the sampler cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.thread_name.trim().is_empty() {
            return Err(LoadError::config_error("thread name must not be empty"));
        }
        if self.thread_name.contains('\0') {
            return Err(LoadError::config_error("thread name must not contain NUL bytes"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SamplerConfig::default();
        assert!(config.zero_bootstrap);
        assert!(!config.dedicated_thread);
        assert_eq!(config.thread_name, "load-sampler");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SamplerConfig::default()
            .with_zero_bootstrap(false)
            .with_dedicated_thread(true)
            .with_thread_name("sampler-0");

        assert!(!config.zero_bootstrap);
        assert!(config.dedicated_thread);
        assert_eq!(config.thread_name, "sampler-0");
    }

    #[test]
    fn test_rejects_empty_thread_name() {
        let config = SamplerConfig::default().with_thread_name("  ");
        assert!(matches!(config.validate(), Err(LoadError::Config(_))));
    }
}
