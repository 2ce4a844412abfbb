//! Configuration loading for the tracing middleware.
//!
//! Configuration is layered with figment. Later sources override earlier ones:
//! 1. Default values (compiled in)
//! 2. Config file: `observability.toml` in the working directory (optional)
//! 3. Environment variables with the `OBSERVABILITY_` prefix
//!
//! | Variable | Config Key | Default |
//! |----------|------------|---------|
//! | `OBSERVABILITY_CORRELATION_ID_HEADER` | `correlation_id_header` or `correlationIdHeader` | `correlationId` |

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "observability.toml";
const ENV_PREFIX: &str = "OBSERVABILITY_";

/// Header (HTTP) or metadata key (gRPC) carrying the correlation identifier
/// when nothing else is configured.
pub const DEFAULT_CORRELATION_ID_HEADER: &str = "correlationId";

/// Settings shared by the HTTP and gRPC interceptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Name of the header or metadata key holding the correlation identifier.
    #[serde(alias = "correlationIdHeader")]
    pub correlation_id_header: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            correlation_id_header: DEFAULT_CORRELATION_ID_HEADER.to_string(),
        }
    }
}

impl TracingConfig {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is present but cannot be parsed.
    pub fn load() -> crate::Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration using a custom config file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    /// The file may spell the key `correlationIdHeader`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is present but cannot be parsed.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> crate::Result<Self> {
        // The file is resolved on its own so both key spellings collapse to
        // the canonical one before the environment is layered on top.
        let file = if config_path.as_ref().exists() {
            Figment::from(Toml::file(config_path)).extract()?
        } else {
            Self::default()
        };

        let config = Figment::from(Serialized::defaults(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;

        Ok(config)
    }

    /// Creates a new config builder.
    pub fn builder() -> TracingConfigBuilder {
        TracingConfigBuilder::new()
    }

    /// Returns the configured correlation key, or the default when blank.
    pub(crate) fn correlation_key(&self) -> &str {
        let key = self.correlation_id_header.trim();
        if key.is_empty() {
            DEFAULT_CORRELATION_ID_HEADER
        } else {
            key
        }
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
#[derive(Debug, Default)]
pub struct TracingConfigBuilder {
    config: TracingConfig,
}

impl TracingConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation identifier header name.
    pub fn correlation_id_header(mut self, header: impl Into<String>) -> Self {
        self.config.correlation_id_header = header.into();
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TracingConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.correlation_id_header, "correlationId");
        assert_eq!(config.correlation_key(), "correlationId");
    }

    #[test]
    fn test_builder() {
        let config = TracingConfig::builder()
            .correlation_id_header("x-correlation-id")
            .build();
        assert_eq!(config.correlation_key(), "x-correlation-id");
    }

    #[test]
    fn test_blank_header_falls_back_to_default() {
        let config = TracingConfig::builder().correlation_id_header("  ").build();
        assert_eq!(config.correlation_key(), DEFAULT_CORRELATION_ID_HEADER);
    }

    #[test]
    #[serial]
    fn test_load_from_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"correlation_id_header = \"x-request-id\"\n")
            .unwrap();

        let config = TracingConfig::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.correlation_id_header, "x-request-id");
    }

    #[test]
    #[serial]
    fn test_load_accepts_camel_case_key() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"correlationIdHeader = \"traceCorrelation\"\n")
            .unwrap();

        let config = TracingConfig::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.correlation_id_header, "traceCorrelation");
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = TracingConfig::load_from_path("/nonexistent/path/observability.toml").unwrap();
        assert_eq!(config, TracingConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"correlation_id_header = \"from-file\"\n")
            .unwrap();

        temp_env::with_var(
            "OBSERVABILITY_CORRELATION_ID_HEADER",
            Some("from-env"),
            || {
                let config = TracingConfig::load_from_path(temp_file.path()).unwrap();
                assert_eq!(config.correlation_id_header, "from-env");
            },
        );
    }

    #[test]
    #[serial]
    fn test_env_overrides_camel_case_file_key() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"correlationIdHeader = \"from-file\"\n")
            .unwrap();

        temp_env::with_var(
            "OBSERVABILITY_CORRELATION_ID_HEADER",
            Some("from-env"),
            || {
                let config = TracingConfig::load_from_path(temp_file.path()).unwrap();
                assert_eq!(config.correlation_id_header, "from-env");
            },
        );
    }

    #[test]
    #[serial]
    fn test_env_only() {
        temp_env::with_var(
            "OBSERVABILITY_CORRELATION_ID_HEADER",
            Some("x-env-id"),
            || {
                let config =
                    TracingConfig::load_from_path("/nonexistent/path/observability.toml").unwrap();
                assert_eq!(config.correlation_id_header, "x-env-id");
            },
        );
    }

    #[test]
    #[serial]
    fn test_invalid_toml_is_an_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"correlation_id_header = [1, 2]\n").unwrap();

        let err = TracingConfig::load_from_path(temp_file.path()).unwrap_err();
        assert!(matches!(err, crate::TracingError::Config(_)));
    }
}
