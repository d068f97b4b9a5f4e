//! bcast configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::broadcaster::BroadcasterConfig;
use crate::drill::DrillOptions;

/// Main bcast configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Broadcaster sizing
    pub broadcaster: BroadcasterConfig,

    /// Defaults for `bcast drill`
    pub drill: DrillOptions,
}

/// Project-local config file, looked up in the working directory
const LOCAL_CONFIG: &str = ".bcast.yml";

impl Config {
    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first readable file among
    /// [`Config::search_paths`] wins, falling back to defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let found = Self::search_paths().filter(|path| path.exists()).find_map(|path| {
            Self::load_from_file(&path)
                .inspect_err(|e| warn!(path = %path.display(), error = %e, "Skipping unreadable config"))
                .ok()
        });

        Ok(found.unwrap_or_else(|| {
            debug!("No config file found, using defaults");
            Self::default()
        }))
    }

    /// Implicit config locations, highest priority first:
    /// `./.bcast.yml`, then `<config dir>/bcast/bcast.yml`
    pub fn search_paths() -> impl Iterator<Item = PathBuf> {
        std::iter::once(PathBuf::from(LOCAL_CONFIG))
            .chain(dirs::config_dir().map(|dir| dir.join("bcast").join("bcast.yml")))
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full `load` reports them later.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    /// Write this config as YAML, as `bcast config --write` does
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(path, content).context(format!("Failed to write config to {}", path.display()))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}
