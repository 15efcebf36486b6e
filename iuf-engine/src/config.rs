//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{IufError, ValidationError};
use crate::graph::MIN_TASK_NAME_LEN;
use crate::params::PROCESS_MEDIA_STAGE;
use crate::retry::RetryConfig;

/// Tunables of the orchestration engine.
///
/// ```yaml
/// process_media_stage: process-media
/// template_entrypoint: main
/// max_task_name_len: 63
/// deletion_retry:
///   max_attempts: 3
///   base_delay_ms: 1000
///   backoff_strategy: linear
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stage whose outputs describe newly discovered products.
    #[serde(default = "default_process_media_stage")]
    pub process_media_stage: String,
    /// Entrypoint used for every template reference.
    #[serde(default = "default_entrypoint")]
    pub template_entrypoint: String,
    /// Maximum task identifier length accepted by the execution engine.
    #[serde(default = "default_max_task_name_len")]
    pub max_task_name_len: usize,
    /// Retry policy for cascading deletes.
    #[serde(default)]
    pub deletion_retry: RetryConfig,
}

fn default_process_media_stage() -> String {
    PROCESS_MEDIA_STAGE.to_string()
}

fn default_entrypoint() -> String {
    "main".to_string()
}

fn default_max_task_name_len() -> usize {
    63
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_media_stage: default_process_media_stage(),
            template_entrypoint: default_entrypoint(),
            max_task_name_len: default_max_task_name_len(),
            deletion_retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from YAML. Missing keys take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, IufError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values the execution engine could not work with.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_task_name_len < MIN_TASK_NAME_LEN {
            return Err(ValidationError::new(format!(
                "max_task_name_len must be at least {MIN_TASK_NAME_LEN}, got {}",
                self.max_task_name_len
            ))
            .with_field("max_task_name_len"));
        }
        Ok(())
    }

    /// Loads a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, IufError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            IufError::Serialization(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Sets the template entrypoint.
    #[must_use]
    pub fn with_template_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.template_entrypoint = entrypoint.into();
        self
    }

    /// Sets the media processing stage name.
    #[must_use]
    pub fn with_process_media_stage(mut self, stage: impl Into<String>) -> Self {
        self.process_media_stage = stage.into();
        self
    }

    /// Sets the maximum task name length.
    #[must_use]
    pub fn with_max_task_name_len(mut self, len: usize) -> Self {
        self.max_task_name_len = len;
        self
    }

    /// Sets the deletion retry policy.
    #[must_use]
    pub fn with_deletion_retry(mut self, retry: RetryConfig) -> Self {
        self.deletion_retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffStrategy;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.process_media_stage, "process-media");
        assert_eq!(config.max_task_name_len, 63);
        assert_eq!(config.deletion_retry.max_attempts, 3);
        assert_eq!(config.deletion_retry.backoff_strategy, BackoffStrategy::Linear);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = EngineConfig::from_yaml_str(
            "max_task_name_len: 40\ndeletion_retry:\n  max_attempts: 5\n",
        )
        .unwrap();
        assert_eq!(config.max_task_name_len, 40);
        assert_eq!(config.deletion_retry.max_attempts, 5);
        assert_eq!(config.deletion_retry.base_delay_ms, 1000);
        assert_eq!(config.template_entrypoint, "main");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"process_media_stage: media\n").unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.process_media_stage, "media");
    }

    #[test]
    fn test_short_task_name_limit_rejected() {
        let err = EngineConfig::from_yaml_str("max_task_name_len: 4").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("max_task_name_len"));

        let config = EngineConfig::from_yaml_str("max_task_name_len: 10").unwrap();
        assert_eq!(config.max_task_name_len, MIN_TASK_NAME_LEN);
    }

    #[test]
    fn test_invalid_yaml_is_serialization_error() {
        let err = EngineConfig::from_yaml_str("max_task_name_len: [").unwrap_err();
        assert!(matches!(err, IufError::Serialization(_)));
    }
}
