//! Configuration management for metaobjects
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (metaobjects.toml)
//! - Environment variables (METAOBJECTS__*)
//!
//! ## Example config file (metaobjects.toml):
//! ```toml
//! [loader]
//! init_timeout_ms = 30000
//! retry_attempts = 3
//! retry_delay_ms = 100
//! should_register = true
//! strict = true
//!
//! [registry]
//! disabled_providers = ["database-extensions"]
//!
//! [logging]
//! filter = "metaobjects=debug"
//! ```

use std::time::Duration;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::loader::LoaderOptions;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetaObjectsConfig {
    /// Defaults applied to loaders built from this config
    #[serde(default)]
    pub loader: LoaderDefaults,

    /// Provider bootstrap settings
    #[serde(default)]
    pub registry: RegistrySettings,

    /// Logging settings for binaries
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Loader defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderDefaults {
    /// Wait for a concurrent initialization, in milliseconds
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Total attempts made by `init_with_retry`
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between retry attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Publish loaders into the directory once initialized
    #[serde(default)]
    pub should_register: bool,

    #[serde(default)]
    pub verbose: bool,

    /// Fail initialization on validation errors
    #[serde(default = "default_true")]
    pub strict: bool,
}

/// Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Provider ids skipped by the bootstrap
    #[serde(default)]
    pub disabled_providers: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_init_timeout_ms() -> u64 {
    30_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoaderDefaults {
    fn default() -> Self {
        Self {
            init_timeout_ms: default_init_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            should_register: false,
            verbose: false,
            strict: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl From<&LoaderDefaults> for LoaderOptions {
    fn from(defaults: &LoaderDefaults) -> Self {
        LoaderOptions::new()
            .with_register(defaults.should_register)
            .with_verbose(defaults.verbose)
            .with_strict(defaults.strict)
            .with_init_timeout(Duration::from_millis(defaults.init_timeout_ms))
            .with_retry(
                defaults.retry_attempts,
                Duration::from_millis(defaults.retry_delay_ms),
            )
    }
}

impl MetaObjectsConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["metaobjects.toml", ".metaobjects.toml", "config/metaobjects.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("com", "metaobjects", "metaobjects") {
            let xdg_config = config_dir.config_dir().join("metaobjects.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (METAOBJECTS__LOADER__STRICT=false)
        builder = builder.add_source(
            Environment::with_prefix("METAOBJECTS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Loader options derived from the loader defaults
    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions::from(&self.loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetaObjectsConfig::default();
        assert_eq!(config.loader.init_timeout_ms, 30_000);
        assert!(config.loader.strict);
        assert!(config.registry.disabled_providers.is_empty());
    }

    #[test]
    fn test_serialize_config() {
        let config = MetaObjectsConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[loader]"));
        assert!(toml_str.contains("[registry]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metaobjects.toml");
        let path = path.to_str().unwrap();

        let mut config = MetaObjectsConfig::default();
        config.loader.retry_attempts = 7;
        config.registry.disabled_providers = vec!["database-extensions".to_string()];
        config.save(path).unwrap();

        let loaded = MetaObjectsConfig::load_from(Some(path)).unwrap();
        assert_eq!(loaded.loader.retry_attempts, 7);
        assert_eq!(loaded.registry.disabled_providers, vec!["database-extensions".to_string()]);
    }

    #[test]
    fn test_loader_options_from_defaults() {
        let mut config = MetaObjectsConfig::default();
        config.loader.init_timeout_ms = 250;
        config.loader.should_register = true;
        let options = config.loader_options();
        assert_eq!(options.init_timeout, Duration::from_millis(250));
        assert!(options.should_register);
        assert_eq!(options.retry_attempts, 3);
    }
}
