//! Configuration for reading, writing and importing SIE files
//!
//! Loaded from YAML. Every field has a default so an empty document is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Once;

use crate::encoding::SNIFF_PREFIX_LEN;
use crate::types::{SieError, SieResult};

/// Upload limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Largest accepted file in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
    /// Accepted content types; the empty string stands for "not sent"
    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,
    /// Leading bytes inspected when sniffing for CP850
    #[serde(default = "default_sniff_prefix_len")]
    pub sniff_prefix_len: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_content_types: default_content_types(),
            sniff_prefix_len: default_sniff_prefix_len(),
        }
    }
}

fn default_max_file_size() -> usize {
    50 * 1024 * 1024
}

fn default_content_types() -> Vec<String> {
    vec![
        "text/plain".to_string(),
        "application/octet-stream".to_string(),
        "application/x-sie".to_string(),
        String::new(),
    ]
}

fn default_sniff_prefix_len() -> usize {
    SNIFF_PREFIX_LEN
}

/// Settings used when writing SIE files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Written in `#PROGRAM`
    #[serde(default = "default_program_name")]
    pub program_name: String,
    #[serde(default = "default_program_version")]
    pub program_version: String,
    /// Series used for verifications that have none
    #[serde(default = "default_series")]
    pub default_series: String,
    /// Decimals written for amounts
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            program_name: default_program_name(),
            program_version: default_program_version(),
            default_series: default_series(),
            decimal_places: default_decimal_places(),
        }
    }
}

fn default_program_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_program_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_series() -> String {
    "A".to_string()
}

fn default_decimal_places() -> u32 {
    2
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SieConfig {
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SieConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> SieResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(content: &str) -> SieResult<Self> {
        let config: SieConfig = if content.trim().is_empty() {
            SieConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> SieResult<()> {
        if self.upload.max_file_size == 0 {
            return Err(SieError::Config(
                "upload.max_file_size must be greater than 0".to_string(),
            ));
        }

        if self.upload.sniff_prefix_len == 0 {
            return Err(SieError::Config(
                "upload.sniff_prefix_len must be greater than 0".to_string(),
            ));
        }

        if self.export.decimal_places > 4 {
            return Err(SieError::Config(
                "export.decimal_places must be between 0 and 4".to_string(),
            ));
        }

        if self.export.default_series.chars().any(char::is_whitespace) {
            return Err(SieError::Config(
                "export.default_series cannot contain whitespace".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(SieError::Config(format!(
                "logging.level '{}' is not a valid level",
                self.logging.level
            )));
        }

        Ok(())
    }
}

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` wins over `level`; the subscriber is installed only once.
pub fn init_tracing(level: &str) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("sie_core={}", level)));

        let _ = fmt().with_env_filter(filter).try_init();
    });
}
