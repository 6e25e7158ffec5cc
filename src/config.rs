//! Configuration loading.
//!
//! Settings come from, in increasing priority: built-in defaults, the JSON
//! file `<config dir>/config.json`, `TAILSHIP_*` environment variables, and
//! finally command-line flags (applied by the caller).

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::ws;

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "TAILSHIP_CONFIG_DIR";

/// Configuration for the tailship CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the event-log server.
    pub server_url: String,
    /// Tags attached to every published event.
    pub tags: Vec<String>,
    /// Output template name for printed events.
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:6433".to_string(),
            tags: Vec::new(),
            format: "default".to_string(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `TAILSHIP_CONFIG_DIR` wins; otherwise the platform config dir
    /// (Linux: `~/.config/tailship`).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("tailship"))
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse the config file at `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Apply `TAILSHIP_SERVER_URL` and `TAILSHIP_TAGS` as looked up by `var`.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(server_url) = var("TAILSHIP_SERVER_URL") {
            self.server_url = server_url;
        }

        if let Some(tags) = var("TAILSHIP_TAGS") {
            self.tags = split_tags(&tags);
        }
    }

    /// Server URL with `http(s)` rewritten to `ws(s)`, checked to be usable.
    pub fn validated_server_url(&self) -> Result<String> {
        let url = ws::http_to_ws_scheme(self.server_url.trim());
        anyhow::ensure!(!url.is_empty(), "No server URL configured");
        ws::validate_url(&url).with_context(|| format!("Invalid server URL {url:?}"))?;
        Ok(url)
    }
}

/// Split a comma-separated tag list, dropping blanks.
pub fn split_tags(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}
