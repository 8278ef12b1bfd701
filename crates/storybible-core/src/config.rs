use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::error::ConfigError;
use super::reconcile::Reconciler;

/// Smallest byte bound that still fits the opener plus a short action.
pub const MIN_PENDING_BYTES: usize = 32;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct StorybibleConfig {
    pub stream: StreamConfig,
    pub reconcile: ReconcileConfig,
    pub log: LogConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StreamConfig {
    pub max_pending_bytes: usize,
    pub max_pending_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: 512,
            max_pending_ms: 2_000,
        }
    }
}

impl StreamConfig {
    pub fn max_pending(&self) -> Duration {
        Duration::from_millis(self.max_pending_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileConfig {
    pub enabled: bool,
    /// Commitment regexes. Empty means the built-in list.
    pub patterns: Vec<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub issue_capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            issue_capacity: 500,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl StorybibleConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.max_pending_bytes < MIN_PENDING_BYTES {
            return Err(ConfigError::InvalidValue {
                key: "stream.max_pending_bytes".to_string(),
                reason: format!("must be at least {MIN_PENDING_BYTES}"),
            });
        }
        if self.stream.max_pending_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "stream.max_pending_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.log.issue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "log.issue_capacity".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Compiles the reconciliation patterns. `None` when reconciliation is off.
    pub fn reconciler(&self) -> Result<Option<Reconciler>, ConfigError> {
        if !self.reconcile.enabled {
            return Ok(None);
        }
        let reconciler = if self.reconcile.patterns.is_empty() {
            Reconciler::with_defaults()?
        } else {
            Reconciler::new(self.reconcile.patterns.as_slice())?
        };
        Ok(Some(reconciler))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = StorybibleConfig::from_toml_str("").expect("parse");
        assert_eq!(config, StorybibleConfig::default());
        assert_eq!(config.stream.max_pending(), Duration::from_secs(2));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = StorybibleConfig::from_toml_str(
            r#"
            [stream]
            max_pending_ms = 750

            [provider]
            command = "ollama"
            args = ["run", "llama3"]
            "#,
        )
        .expect("parse");
        assert_eq!(config.stream.max_pending_bytes, 512);
        assert_eq!(config.stream.max_pending_ms, 750);
        assert_eq!(config.provider.command.as_deref(), Some("ollama"));
        assert_eq!(config.log.issue_capacity, 500);
    }

    #[test]
    fn tiny_byte_bound_is_rejected() {
        let err = StorybibleConfig::from_toml_str("[stream]\nmax_pending_bytes = 8\n")
            .expect_err("too small");
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "stream.max_pending_bytes"));
    }

    #[test]
    fn custom_patterns_must_compile() {
        let config = StorybibleConfig::from_toml_str(
            "[reconcile]\npatterns = [\"(?P<field>title\"]\n",
        )
        .expect("parse");
        assert!(matches!(
            config.reconciler(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn disabled_reconciliation_compiles_nothing() {
        let config =
            StorybibleConfig::from_toml_str("[reconcile]\nenabled = false\n").expect("parse");
        assert!(config.reconciler().expect("ok").is_none());
    }

    #[test]
    fn load_reports_missing_file_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.toml");
        let err = StorybibleConfig::load(&path).expect_err("missing");
        assert!(err.to_string().contains("missing.toml"));
    }
}
