//! Configuration loading and management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Overrides the runtime data directory
pub const DATA_DIR_ENV: &str = "CMDSWITCH_DATA_DIR";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// File holding the Command key mappings
    pub preferences_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = std::env::var("HOME").context("HOME is not set")?;
                PathBuf::from(home).join(".local").join("share").join("cmdswitch")
            }
        };

        Ok(Self::with_data_dir(data_dir))
    }

    /// Derive every path from `data_dir`
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            socket_path: data_dir.join("daemon.sock"),
            preferences_path: data_dir.join("preferences.json"),
            data_dir,
        }
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {:?}", self.data_dir))?;
        Ok(())
    }
}
