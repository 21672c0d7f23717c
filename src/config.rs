//! Configuration management for the prediction service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Serialized classifier format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// XGBoost JSON document, evaluated natively
    #[default]
    Xgboost,
    /// ONNX graph run through ONNX Runtime (requires the `onnx` feature)
    Onnx,
}

impl ModelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFormat::Xgboost => "xgboost",
            ModelFormat::Onnx => "onnx",
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `host:port` for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Prediction artifact locations
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Serialized classifier format
    #[serde(default)]
    pub format: ModelFormat,
    /// Classifier file produced by training
    pub model_path: String,
    /// Ordered class labels produced by training
    pub classes_path: String,
    /// Whether the label file starts with a header row
    #[serde(default = "default_classes_has_header")]
    pub classes_has_header: bool,
}

fn default_classes_has_header() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

/// Serving metrics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl AppConfig {
    /// Load configuration from `PENGUIN_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("PENGUIN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// The file is optional; built-in defaults fill anything it leaves out
    /// and `PENGUIN__SECTION__KEY` environment variables override both.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = AppConfig::default();

        let config = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", defaults.server.port)?
            .set_default("model.format", defaults.model.format.as_str())?
            .set_default("model.model_path", defaults.model.model_path)?
            .set_default("model.classes_path", defaults.model.classes_path)?
            .set_default("model.classes_has_header", defaults.model.classes_has_header)?
            .set_default("logging.level", defaults.logging.level)?
            .set_default("logging.format", defaults.logging.format)?
            .set_default(
                "metrics.report_interval_secs",
                defaults.metrics.report_interval_secs,
            )?
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("PENGUIN").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            model: ModelConfig {
                format: ModelFormat::Xgboost,
                model_path: "app/data/model.json".to_string(),
                classes_path: "app/data/target_classes.csv".to_string(),
                classes_has_header: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
            metrics: MetricsConfig {
                report_interval_secs: 60,
            },
        }
    }
}
