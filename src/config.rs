use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SorterError};

/// Fixed location of the optional configuration file
pub const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub labels: LabelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchConfig {
    /// Gmail search query selecting candidate messages
    #[serde(default = "default_query")]
    pub query: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelConfig {
    /// Parent segment of every created label (`<parent>/<sender>`)
    #[serde(default = "default_parent")]
    pub parent: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            parent: default_parent(),
        }
    }
}

fn default_query() -> String {
    "{from:admission*@*.edu from:admissions*@*.edu} has:nouserlabels".to_string()
}

fn default_parent() -> String {
    "College".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SorterError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_toml(&content)?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parses and validates TOML configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SorterError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.search.query.trim().is_empty() {
            return Err(SorterError::ConfigError(
                "search.query cannot be empty".to_string(),
            ));
        }

        let parent = self.labels.parent.trim();
        if parent.is_empty() {
            return Err(SorterError::ConfigError(
                "labels.parent cannot be empty".to_string(),
            ));
        }
        if parent.starts_with('/') || parent.ends_with('/') {
            return Err(SorterError::ConfigError(format!(
                "labels.parent must not start or end with '/': {}",
                self.labels.parent
            )));
        }

        Ok(())
    }
}
