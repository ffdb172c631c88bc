use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::Algorithm;
use crate::privacy::SanitizerConfig;
use crate::services::PiiPolicy;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub sanitizer: SanitizerSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub secure_message: SecureMessageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

#[derive(Debug, Clone, Deserialize)]
pub struct SanitizerSettings {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Bytes
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    #[serde(default = "default_detection_timeout_ms")]
    pub detection_timeout_ms: u64,
    /// Optional entity-detection model
    pub model: Option<ModelSettings>,
}

impl Default for SanitizerSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_input_length: default_max_input_length(),
            detection_timeout_ms: default_detection_timeout_ms(),
            model: None,
        }
    }
}

impl SanitizerSettings {
    pub fn to_config(&self) -> SanitizerConfig {
        SanitizerConfig {
            confidence_threshold: self.confidence_threshold,
            max_input_length: self.max_input_length,
            detection_timeout: Duration::from_millis(self.detection_timeout_ms),
        }
    }
}

fn default_confidence_threshold() -> f64 { 0.75 }
fn default_max_input_length() -> usize { 16 * 1024 }
fn default_detection_timeout_ms() -> u64 { 2000 }

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default)]
    pub default_algorithm: Algorithm,
    #[serde(default)]
    pub default_min_score: f64,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_algorithm: Algorithm::default(),
            default_min_score: 0.0,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> usize { 20 }
fn default_max_limit() -> usize { 100 }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub pii_policy: PiiPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecureMessageSettings {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for SecureMessageSettings {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_max_payload_bytes() -> usize { 64 * 1024 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "compact".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Local overrides (config/local.toml)
    /// 4. Environment variables (prefixed with UNIVERSA__)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., UNIVERSA__SANITIZER__CONFIDENCE_THRESHOLD -> sanitizer.confidence_threshold
            .add_source(
                Environment::with_prefix("UNIVERSA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("UNIVERSA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = substitute_env_vars(settings)?.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.sanitizer.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Message(format!(
                "sanitizer.confidence_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.matching.default_min_score) {
            return Err(ConfigError::Message(format!(
                "matching.default_min_score must be within [0, 1], got {}",
                self.matching.default_min_score
            )));
        }
        if self.sanitizer.max_input_length == 0 {
            return Err(ConfigError::Message(
                "sanitizer.max_input_length must be positive".to_string(),
            ));
        }
        if self.matching.default_limit == 0 || self.matching.max_limit == 0 {
            return Err(ConfigError::Message(
                "matching limits must be positive".to_string(),
            ));
        }
        if self.secure_message.max_payload_bytes == 0 {
            return Err(ConfigError::Message(
                "secure_message.max_payload_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Apply well-known environment variables that live outside the UNIVERSA__ namespace
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    apply_model_api_key(settings, std::env::var("PII_MODEL_API_KEY").ok())
}

/// The key only means something next to a model endpoint; without one it is ignored
fn apply_model_api_key(settings: Config, api_key: Option<String>) -> Result<Config, ConfigError> {
    let Some(api_key) = api_key else {
        return Ok(settings);
    };

    if settings.get_string("sanitizer.model.endpoint").is_err() {
        tracing::debug!("PII_MODEL_API_KEY set without sanitizer.model.endpoint; ignoring it");
        return Ok(settings);
    }

    Config::builder()
        .add_source(settings)
        .set_override("sanitizer.model.api_key", api_key)?
        .build()
}
