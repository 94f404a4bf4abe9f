//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/planloom/config.toml)
//! 3. Project config (.planloom/config.toml)
//! 4. Environment variables (PLANLOOM_* prefix)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{LoomError, Result};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Merge global config
        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        // Merge project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        // Merge environment variables last (highest priority).
        // Double underscore separates sections from keys so multi-word
        // keys survive: PLANLOOM_RETRY__MAX_RETRIES -> retry.max_retries
        figment = figment.merge(Env::prefixed("PLANLOOM_").split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| LoomError::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, merged over defaults
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(LoomError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| LoomError::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Get the global config directory (~/.config/planloom)
    pub fn global_dir() -> Option<PathBuf> {
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join("planloom"));
        }
        env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config").join("planloom"))
    }

    /// Get the global config file path
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get the project config directory relative to a project root
    pub fn project_dir_in(root: &Path) -> PathBuf {
        root.join(".planloom")
    }

    /// Get the project config file path (relative to the current directory)
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".planloom").join("config.toml")
    }

    /// Initialize project configuration under the given root.
    /// Creates .planloom/config.toml with commented defaults.
    pub fn init_project_in(root: &Path) -> Result<PathBuf> {
        let dir = Self::project_dir_in(root);
        fs::create_dir_all(&dir)
            .map_err(|e| LoomError::Config(format!("Failed to create config dir: {}", e)))?;

        let config_path = dir.join("config.toml");
        if config_path.exists() {
            info!("Project config already exists: {}", config_path.display());
            return Ok(config_path);
        }

        fs::write(&config_path, Self::default_project_config())
            .map_err(|e| LoomError::Config(format!("Failed to write config: {}", e)))?;

        info!("Created project config: {}", config_path.display());
        Ok(config_path)
    }

    /// Initialize project configuration in the current directory
    pub fn init_project() -> Result<PathBuf> {
        let cwd = env::current_dir()
            .map_err(|e| LoomError::Config(format!("Failed to resolve current dir: {}", e)))?;
        Self::init_project_in(&cwd)
    }

    /// Default project config file content
    fn default_project_config() -> String {
        r#"# planloom project configuration
# Values here override the global config (~/.config/planloom/config.toml).
# Environment variables (PLANLOOM_* prefix, double underscore between
# section and key) override everything.

version = "1.0"

[ai]
# api_base = "https://api.openai.com/v1"
# model = "gpt-4o-mini"
# Set the key via PLANLOOM_AI_API_KEY rather than committing it here.
# timeout_secs = 120
# temperature = 0.7
# max_tokens = 4096

[rate_limit]
# max_requests = 10
# window_secs = 60

[retry]
# max_retries = 3
# base_delay_secs = 1
# ai_attempt_timeout_secs = 120
# store_attempt_timeout_secs = 15

[sync]
# endpoint = "https://sync.example.com/v1"
# Set the token via PLANLOOM_SYNC__TOKEN rather than committing it here.
# timeout_secs = 15
"#
        .to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
