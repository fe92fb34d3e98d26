//! Configuration module for stbridge.
//!
//! Typed configuration mapped to a YAML file, with loading, validation,
//! defaults, and a builder for embedding applications that configure the
//! facade programmatically.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for stbridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one event per line.
    #[default]
    Pretty,
    /// Newline-delimited JSON, for log shippers.
    Json,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: a level (`trace` .. `error`) or a full
    /// `EnvFilter` directive such as `stbridge_core=debug,info`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
    /// Include the event target (module path) in output.
    pub with_target: bool,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/stbridge/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("stbridge")
            .join("config.yaml")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            with_target: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"logging.level"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid bare values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- logging ---
        let level = self.logging.level.trim();
        if level.is_empty() {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: "must not be empty".into(),
            });
        } else if !is_directive(level) && !VALID_LOG_LEVELS.contains(&level) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        } else if let Err(err) = tracing_subscriber::EnvFilter::try_new(level) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!("invalid filter directive: {err}"),
            });
        }

        errors
    }
}

/// Directives name a target (`crate=level`) or list several (`a,b`).
fn is_directive(level: &str) -> bool {
    level.contains('=') || level.contains(',')
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust
/// use stbridge_core::config::{ConfigBuilder, LogFormat};
///
/// let config = ConfigBuilder::new()
///     .logging_level("debug")
///     .logging_format(LogFormat::Json)
///     .build();
/// assert!(config.validate().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: LogFormat) -> Self {
        self.config.logging.format = format;
        self
    }

    pub fn logging_with_target(mut self, with_target: bool) -> Self {
        self.config.logging.with_target = with_target;
        self
    }

    /// Consume the builder and return the [`Config`] without validation.
    pub fn build(self) -> Config {
        self.config
    }

    /// Consume the builder, validate, and return the [`Config`] or errors.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let errors = self.config.validate();
        if errors.is_empty() {
            Ok(self.config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
