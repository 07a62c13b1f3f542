//! Configuration loading

use anyhow::{Context, Result};
use ::config::{Environment, File, FileFormat};
use pkgauth_core::PluginConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Prefix for environment overrides, e.g. `PKGAUTH__SERVER__PORT=8080`
const ENV_PREFIX: &str = "PKGAUTH";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Authentication plugin settings, resolved by `PluginConfig::resolve`
    #[serde(default)]
    pub plugin: PluginConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    4874
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file, layered with `PKGAUTH__*` environment overrides
    ///
    /// A missing file is not an error; defaults and environment values apply.
    /// Nothing is logged here since logging is configured from the result.
    pub fn load(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config file: {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config file: {}", path))
    }
}

/// Log where the configuration came from; call once logging is initialized
pub fn log_source(path: &str) {
    info!("{}", describe_source(path));
}

fn describe_source(path: &str) -> String {
    if Path::new(path).exists() {
        format!("Loaded configuration from {}", path)
    } else {
        format!("Config file not found at {}, using defaults", path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load(path.to_str().unwrap()).unwrap();

        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 4874);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.metrics.enabled);
        assert!(config.plugin.store_uri.is_none());
    }

    #[test]
    fn test_describe_source() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.toml");
        assert_eq!(
            describe_source(absent.to_str().unwrap()),
            format!("Config file not found at {}, using defaults", absent.display())
        );

        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(describe_source(path), format!("Loaded configuration from {}", path));
    }

    #[test]
    fn test_load_plugin_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
            [server]
            port = 9000

            [logging]
            format = "json"

            [plugin]
            store_uri = "sqlite://data/users.db"
            database_name = "registry"
            user_collection = "users"
            allow_registration = true

            [plugin.roles]
            publish = "maintainer"
            "#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.plugin.allow_registration, Some(true));

        let resolved = config.plugin.resolve().unwrap();
        assert_eq!(resolved.user_collection, "users");
        assert_eq!(resolved.roles.publish, pkgauth_core::RoleMode::Maintainer);
    }
}
