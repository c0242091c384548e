//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/llm-resilience/config.toml)
//! 3. Project config (.llm-resilience/config.toml)
//! 4. Environment variables (LLM_RESILIENCE_* prefix, `__` between levels)

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::{debug, info};

use super::types::Config;
use crate::types::{ResilienceError, Result};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LLM_RESILIENCE_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // e.g. LLM_RESILIENCE_RESILIENCE__FAILURE_THRESHOLD -> resilience.failure_threshold
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        Self::extract(figment)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(ResilienceError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path));

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Config> {
        let config: Config = figment
            .extract()
            .map_err(|e| ResilienceError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/llm-resilience/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("llm-resilience"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(".llm-resilience")
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Show current effective configuration
    pub fn show_config(config: &Config, as_json: bool) -> Result<()> {
        if as_json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| ResilienceError::Config(e.to_string()))?
            );
        }

        Ok(())
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            ResilienceError::Config("Cannot determine global config directory".to_string())
        })?;

        Self::write_config(&global_dir, force)
    }

    /// Initialize project configuration
    pub fn init_project(force: bool) -> Result<PathBuf> {
        Self::write_config(&Self::project_dir(), force)
    }

    fn write_config(dir: &Path, force: bool) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let config_path = dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_config())?;
            info!("Created config: {}", config_path.display());
        } else {
            info!("Config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Default config file content (TOML)
    fn default_config() -> &'static str {
        r#"# llm-resilience configuration
# Project settings in .llm-resilience/config.toml override the global file.

version = "1.0"

[resilience]
failure_threshold = 5
timeout_seconds = 300

[resilience.default_retry_policy]
max_attempts = 3
base_delay_secs = 1.0
max_delay_secs = 60.0
exponential_base = 2.0
jitter = true

[resilience.rate_limit_retry_policy]
max_attempts = 3
base_delay_secs = 2.0

[resilience.network_retry_policy]
max_attempts = 2
base_delay_secs = 1.0

[generation]
max_tokens = 4096
temperature = 0.7

[storage]
backend = "sqlite"
path = ".llm-resilience/circuits.db"

# Fallback chains, tried in order when a model cannot serve a request
# [models."gpt-4o"]
# fallback_chain = ["claude-sonnet", "gemini-pro"]
#
# [models."gpt-4o".retry.rate_limit]
# max_attempts = 5
# base_delay_secs = 4.0
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use figment::Jail;

    fn config_error(e: ResilienceError) -> figment::Error {
        figment::Error::from(e.to_string())
    }

    #[test]
    fn test_load_default_config() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            let config = ConfigLoader::load().map_err(config_error)?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_project_overrides_global() {
        Jail::expect_with(|jail| {
            let xdg = jail.directory().join("xdg");
            jail.set_env("XDG_CONFIG_HOME", xdg.display());

            fs::create_dir_all(xdg.join("llm-resilience")).map_err(|e| e.to_string())?;
            fs::write(
                xdg.join("llm-resilience/config.toml"),
                "[resilience]\nfailure_threshold = 7\ntimeout_seconds = 60\n",
            )
            .map_err(|e| e.to_string())?;

            jail.create_dir(".llm-resilience")?;
            jail.create_file(
                ".llm-resilience/config.toml",
                "[resilience]\nfailure_threshold = 2\n",
            )?;

            let config = ConfigLoader::load().map_err(config_error)?;
            assert_eq!(config.resilience.failure_threshold, 2);
            assert_eq!(config.resilience.timeout_seconds, 60);
            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.set_env("LLM_RESILIENCE_RESILIENCE__TIMEOUT_SECONDS", 45);
            jail.set_env("LLM_RESILIENCE_STORAGE__BACKEND", "memory");

            let config = ConfigLoader::load().map_err(config_error)?;
            assert_eq!(config.resilience.timeout_seconds, 45);
            assert_eq!(config.storage.backend, StorageBackend::Memory);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("XDG_CONFIG_HOME", jail.directory().join("xdg").display());
            jail.set_env("LLM_RESILIENCE_RESILIENCE__FAILURE_THRESHOLD", 0);

            assert!(ConfigLoader::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn test_default_config_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, ConfigLoader::default_config()).unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.resilience.rate_limit_retry_policy.base_delay_secs, 2.0);
        assert_eq!(config.resilience.network_retry_policy.max_attempts, 2);
        assert!(config.models.is_empty());
    }

    #[test]
    fn test_write_config_respects_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = ConfigLoader::write_config(dir.path(), false).unwrap();
        fs::write(&path, "version = \"custom\"\n").unwrap();

        ConfigLoader::write_config(dir.path(), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "version = \"custom\"\n");

        ConfigLoader::write_config(dir.path(), true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[resilience]"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ConfigLoader::load_from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ResilienceError::Config(_)));
    }
}
