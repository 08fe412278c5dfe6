//! Configuration file loading and management
//!
//! This module handles loading and parsing the daemon configuration from
//! `$XDG_CONFIG_HOME/almanac/config.toml`. If the configuration file doesn't
//! exist, a default configuration is created with documented comments.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Daemon-specific configuration
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Plugin cache and startup configuration
    #[serde(default)]
    pub plugins: PluginsConfig,
    /// Remote plugin repositories, in lookup order
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,
}

/// Daemon process configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Default: "info"
    pub log_level: String,
}

/// Plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginsConfig {
    /// Plugin cache directory
    /// If None, uses `plugins` under the working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Timeout in seconds for repository requests
    /// If None, requests never time out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Plugins to install (if needed) and launch on startup
    #[serde(default)]
    pub autostart: Vec<String>,
}

/// One remote plugin repository
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RepositoryConfig {
    /// URL of the repository listing
    pub url: String,
    /// Whether this repository is consulted
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the specified path
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// The parsed configuration or an error if loading/parsing fails
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default XDG config location
    ///
    /// If the configuration file doesn't exist, creates a default configuration
    /// file with documented comments.
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if !config_path.exists() {
            Self::create_default_file(&config_path)?;
        }

        Self::load(&config_path)
    }

    /// Get the default configuration file path
    ///
    /// Returns `$XDG_CONFIG_HOME/almanac/config.toml`
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "almanac")
            .context("Failed to determine project directories")?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn create_default_file(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write default config file: {}", path.display()))?;

        tracing::info!("Created default configuration file at: {}", path.display());
        Ok(())
    }

    /// Generate the default configuration file content with comments
    fn default_config_content() -> &'static str {
        r#"# almanac Daemon Configuration
# This file configures the almanac-daemon behavior.

[daemon]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set.
# Default: "info"
log_level = "info"

[plugins]
# Directory plugins are cached in, laid out as <name>/<version>/
# If not specified, defaults to ./plugins
# directory = "/path/to/plugins"

# Seconds before a repository request is abandoned
# If not specified, requests never time out
# request_timeout_secs = 30

# Plugins to install (if needed) and launch on startup
autostart = []

# Remote plugin repositories, consulted in order.
# Each entry points at a repository listing document.
#
# [[repositories]]
# url = "https://plugins.example.com/"
# enabled = true
"#
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.daemon.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log_level: {}. Must be one of: {}",
                self.daemon.log_level,
                valid_log_levels.join(", ")
            );
        }

        if self.plugins.request_timeout_secs == Some(0) {
            anyhow::bail!("plugins.request_timeout_secs must be greater than 0");
        }

        if let Some(name) = self.plugins.autostart.iter().find(|n| n.trim().is_empty()) {
            anyhow::bail!("plugins.autostart contains an empty plugin name: {:?}", name);
        }

        let mut seen = HashSet::new();
        for repo in &self.repositories {
            if !(repo.url.starts_with("http://") || repo.url.starts_with("https://")) {
                anyhow::bail!("Repository url must be http(s): {}", repo.url);
            }
            if !seen.insert(repo.url.as_str()) {
                anyhow::bail!("Repository listed twice: {}", repo.url);
            }
        }

        Ok(())
    }

    /// Get the plugin cache directory
    ///
    /// Returns the configured directory or `plugins` relative to the
    /// working directory
    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins
            .directory
            .clone()
            .unwrap_or_else(|| PathBuf::from(almanac_plugins::DEFAULT_ROOT))
    }

    /// Timeout applied to repository requests, if configured
    pub fn request_timeout(&self) -> Option<Duration> {
        self.plugins.request_timeout_secs.map(Duration::from_secs)
    }

    /// URLs of the enabled repositories, in order
    pub fn enabled_repositories(&self) -> impl Iterator<Item = &str> {
        self.repositories
            .iter()
            .filter(|repo| repo.enabled)
            .map(|repo| repo.url.as_str())
    }
}
