//! Configuration loading for the Spesa client.
//!
//! The top-level fields are required. The `cache` and `telemetry` tables may
//! be omitted and fall back to their defaults.

use serde::Deserialize;
use spesa_sync::CacheConfig;
use std::path::{Path, PathBuf};

use crate::telemetry::{LogFormat, TelemetryConfig};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "SPESA_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to, e.g.
    /// `https://server-supermarket-app.onrender.com/api`.
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    /// Where the auth token is persisted between runs.
    pub credential_path: PathBuf,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Drop entries once their last subscriber is gone.
    #[serde(default)]
    pub evict_unused: bool,
    /// Panic on cache consistency violations. Unset means "only in debug builds".
    #[serde(default)]
    pub strict_consistency: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or SPESA_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api_base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.credential_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "credential_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.telemetry.filter.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "telemetry.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Cache settings for [`spesa_sync::CacheStore::new`].
    pub fn cache_config(&self) -> CacheConfig {
        let config = CacheConfig::new().with_eviction(self.cache.evict_unused);
        match self.cache.strict_consistency {
            Some(strict) => config.with_strict_consistency(strict),
            None => config,
        }
    }

    pub fn log_format(&self) -> LogFormat {
        self.telemetry.format
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        api_base_url = "https://server-supermarket-app.onrender.com/api"
        request_timeout_ms = 10000
        credential_path = "/tmp/spesa/token.json"
    "#;

    #[test]
    fn minimal_config_uses_section_defaults() {
        let config = ClientConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.request_timeout_ms, 10_000);
        assert!(!config.cache.evict_unused);
        assert_eq!(config.telemetry.format, LogFormat::Pretty);
        assert_eq!(config.telemetry.filter, "info");
        assert_eq!(
            config.cache_config().strict_consistency,
            CacheConfig::default().strict_consistency
        );
    }

    #[test]
    fn sections_override_defaults() {
        let toml = format!(
            "{}\n[cache]\nevict_unused = true\nstrict_consistency = false\n\n[telemetry]\nfilter = \"spesa_sync=debug\"\nformat = \"json\"\n",
            MINIMAL
        );
        let config = ClientConfig::from_toml_str(&toml).unwrap();
        let cache = config.cache_config();
        assert!(cache.evict_unused);
        assert!(!cache.strict_consistency);
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.telemetry.filter, "spesa_sync=debug");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let toml = format!("{}\nretry_attempts = 3\n", MINIMAL);
        assert!(matches!(
            ClientConfig::from_toml_str(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let toml = format!("{}\n[telemetry]\nformat = \"xml\"\n", MINIMAL);
        assert!(matches!(
            ClientConfig::from_toml_str(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let toml = MINIMAL.replace("10000", "0");
        assert!(matches!(
            ClientConfig::from_toml_str(&toml),
            Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn base_url_needs_a_scheme() {
        let toml = MINIMAL.replace("https://", "");
        assert!(matches!(
            ClientConfig::from_toml_str(&toml),
            Err(ConfigError::InvalidValue {
                field: "api_base_url",
                ..
            })
        ));
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let toml = "api_base_url = \"https://example.org/api\"\n";
        assert!(matches!(
            ClientConfig::from_toml_str(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spesa.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = ClientConfig::from_path(&path).unwrap();
        assert_eq!(config.credential_path, PathBuf::from("/tmp/spesa/token.json"));
    }
}
