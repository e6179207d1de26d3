use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Well-known cache key for the subscribed feed collection.
pub const BLOGS_KEY: &str = "blogs";

const DEFAULT_QUIET_PERIOD_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    /// Quiet window after the last collection replacement before it is persisted.
    pub persist_quiet_period_ms: u64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            persist_quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            cache_dir: None,
        }
    }
}

impl FeedsConfig {
    /// Loads the configuration from a JSON file, falling back to defaults when
    /// the file is missing or unreadable.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<FeedsConfig>(&bytes) {
                Ok(config) => config,
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "failed to parse feeds config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, path = %path.display(), "feeds config not readable, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.persist_quiet_period_ms)
    }

    /// Configured cache directory, or `<config dir>/readrss/cache`.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        let mut dir = dirs::config_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        dir.push("readrss");
        dir.push("cache");
        dir
    }
}
