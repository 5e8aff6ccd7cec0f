//! JSON file configuration adapter.
//!
//! Implements [`ConfigPort`] over a single pretty-printed JSON file.
//! Values are validated after every load and before every save, so an
//! out-of-range file is rejected rather than silently clamped.  Saves go
//! through a temporary sibling file and a rename, so a crash mid-write
//! never leaves a truncated config behind.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::ConfigPort;
use crate::config::SystemConfig;
use crate::error::ConfigError;

pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load, falling back to defaults when no file exists.
    pub fn load_or_default(&self) -> Result<SystemConfig, ConfigError> {
        match self.load() {
            Err(ConfigError::NotFound) => {
                info!("Config: {} not found, using defaults", self.path.display());
                Ok(SystemConfig::default())
            }
            other => other,
        }
    }
}

impl ConfigPort for JsonConfigStore {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let text = fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound,
            _ => ConfigError::Io(e),
        })?;
        let cfg: SystemConfig = serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        cfg.validate()?;
        info!("Config: loaded {} ({} tasks)", self.path.display(), cfg.tasks.len());
        Ok(cfg)
    }

    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text = serde_json::to_string_pretty(config).map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        info!("Config: saved {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}
