//! JSON file configuration adapter.
//!
//! Implements [`ConfigPort`] on top of a single pretty-printed JSON file.
//! Fields missing from the file keep their defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::info;

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::RunConfig;

pub struct JsonConfigFile {
    path: PathBuf,
}

impl JsonConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigPort for JsonConfigFile {
    fn load(&self) -> Result<RunConfig, ConfigError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ConfigError::NotFound),
            Err(e) => return Err(ConfigError::IoError(e.kind())),
        };
        serde_json::from_str(&text).map_err(|e| ConfigError::Corrupted(e.to_string()))
    }

    fn save(&self, config: &RunConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| ConfigError::Corrupted(e.to_string()))?;
        fs::write(&self.path, text).map_err(|e| ConfigError::IoError(e.kind()))?;
        info!("Config saved to {}", self.path.display());
        Ok(())
    }
}
