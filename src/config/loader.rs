//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order:
//!
//! 1. `config/render-cache.toml` (optional)
//! 2. `config/render-cache.{environment}.toml` (optional)
//! 3. `RENDER_CACHE__*` environment variables, `__` separating nested keys
//!    (e.g. `RENDER_CACHE__REDIS__URL`, `RENDER_CACHE__RECONNECT__MAX_ATTEMPTS`)
//!
//! When no Redis URL is configured by any layer, `REDIS_URL` is used.

use super::error::{ConfigResult, ConfigurationError};
use super::{CacheHandlerConfig, RedisConfig};
use crate::constants::{ENV_PREFIX, REDIS_URL_ENV};
use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "render-cache";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: CacheHandlerConfig,
    environment: String,
    config_directory: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a directory with an explicit environment name,
    /// reading overrides from the process environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_sources(
            config_dir,
            environment,
            None,
            env::var(REDIS_URL_ENV).ok(),
        )
    }

    /// Fully explicit loader: `env_vars` replaces the process environment when
    /// given, and `fallback_url` stands in for `REDIS_URL`
    pub fn load_with_sources(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_vars: Option<HashMap<String, String>>,
        fallback_url: Option<String>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading cache handler configuration"
        );

        let base = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let overlay = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let settings = Config::builder()
            .add_source(Self::optional_file(&base))
            .add_source(Self::optional_file(&overlay))
            .add_source(Self::environment_source(env_vars))
            .build()
            .map_err(|e| ConfigurationError::source_error(config_directory.display().to_string(), e))?;

        let mut config: CacheHandlerConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::source_error("merged configuration", e))?;

        apply_url_fallback(&mut config, fallback_url);
        config.validate()?;

        info!(
            environment = environment,
            enabled = config.enabled,
            backend = %config.backend,
            key_prefix = %config.key_prefix,
            default_ttl_seconds = config.default_ttl_seconds,
            "Cache handler configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Some(config_directory),
        }))
    }

    /// Parse configuration from a TOML document, without consulting files or
    /// the process environment
    pub fn from_toml_str(toml: &str) -> ConfigResult<Arc<ConfigManager>> {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| ConfigurationError::source_error("inline TOML", e))?;

        let config: CacheHandlerConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::source_error("inline TOML", e))?;
        config.validate()?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: None,
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: CacheHandlerConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &CacheHandlerConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> Option<&Path> {
        self.config_directory.as_deref()
    }

    /// JSON view of the configuration with credentials masked
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(self.config.sanitized()).unwrap_or(serde_json::Value::Null)
    }

    /// Current environment from `RENDER_CACHE_ENV` or `APP_ENV`
    pub fn detect_environment() -> String {
        env::var("RENDER_CACHE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn optional_file(path: &Path) -> File<config::FileSourceFile, FileFormat> {
        File::from(path).format(FileFormat::Toml).required(false)
    }

    fn environment_source(env_vars: Option<HashMap<String, String>>) -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(env_vars)
    }
}

/// Use the conventional store URL when no layer configured one
fn apply_url_fallback(config: &mut CacheHandlerConfig, fallback_url: Option<String>) {
    if config.redis.is_some() {
        return;
    }
    if let Some(url) = fallback_url.filter(|url| !url.trim().is_empty()) {
        debug!("No cache store URL configured, using {}", REDIS_URL_ENV);
        config.redis = Some(RedisConfig::new(url));
    }
}
