//! Persisted Command key mappings
//!
//! Stored as a small JSON object next to the IPC socket. A missing file
//! means nothing is configured yet.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::hotkey::MonitoredKey;

/// Input source identifier configured for each Command key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
    #[serde(
        rename = "LeftCommandSourceID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub left: Option<String>,

    #[serde(
        rename = "RightCommandSourceID",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub right: Option<String>,
}

impl KeyMapping {
    pub fn get(&self, key: MonitoredKey) -> Option<&str> {
        match key {
            MonitoredKey::Left => self.left.as_deref(),
            MonitoredKey::Right => self.right.as_deref(),
        }
    }

    pub fn slot_mut(&mut self, key: MonitoredKey) -> &mut Option<String> {
        match key {
            MonitoredKey::Left => &mut self.left,
            MonitoredKey::Right => &mut self.right,
        }
    }
}

/// Errors writing the preference file
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to create preferences directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write preferences {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize preferences: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// JSON file holding the [`KeyMapping`]
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved mapping; unreadable files read as empty
    pub fn load(&self) -> KeyMapping {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<KeyMapping>(&contents) {
                Ok(mapping) => mapping,
                Err(e) => {
                    warn!(path = ?self.path, error = %e, "failed to parse preferences");
                    KeyMapping::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?self.path, "no saved preferences");
                KeyMapping::default()
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to read preferences");
                KeyMapping::default()
            }
        }
    }

    /// Write the mapping atomically through a temp file and rename
    pub fn save(&self, mapping: &KeyMapping) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_owned(),
                source,
            })?;
        }

        let contents = serde_json::to_string_pretty(mapping)?;
        let tmp_path = self.path.with_extension("json.tmp");

        std::fs::write(&tmp_path, contents).map_err(|source| StoreError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = ?self.path, "preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("preferences.json"));
        assert_eq!(store.load(), KeyMapping::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferenceStore::new(dir.path().join("nested").join("preferences.json"));

        let mapping = KeyMapping {
            left: Some("com.apple.keylayout.US".to_string()),
            right: None,
        };
        store.save(&mapping).unwrap();
        assert_eq!(store.load(), mapping);
        assert!(!dir.path().join("nested").join("preferences.json.tmp").exists());
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        let store = PreferenceStore::new(&path);

        store
            .save(&KeyMapping {
                left: None,
                right: Some("com.apple.keylayout.Russian".to_string()),
            })
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("RightCommandSourceID"));
        assert!(!raw.contains("LeftCommandSourceID"));
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = PreferenceStore::new(&path);
        assert_eq!(store.load(), KeyMapping::default());
    }

    #[test]
    fn test_mapping_accessors() {
        let mut mapping = KeyMapping::default();
        *mapping.slot_mut(MonitoredKey::Right) = Some("x".to_string());
        assert_eq!(mapping.get(MonitoredKey::Right), Some("x"));
        assert_eq!(mapping.get(MonitoredKey::Left), None);
    }
}
