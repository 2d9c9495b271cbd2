//! Input source catalog and key mapping service
//!
//! Owns the catalog of selectable input sources and the Command key
//! mapping. A mapping always names a source present in the catalog:
//! stale identifiers are cleared when loaded and when the catalog is
//! refreshed.

use std::sync::Arc;

use tracing::{info, warn};

use super::store::{KeyMapping, PreferenceStore};
use crate::hotkey::MonitoredKey;
use crate::input_source::{InputSource, InputSourceBackend};

/// Errors changing a key mapping
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("unknown input source: {0}")]
    UnknownSource(String),
}

/// Catalog and mapping state shared by the switcher and the IPC server
pub struct InputSourceManager {
    backend: Arc<dyn InputSourceBackend>,
    store: PreferenceStore,
    sources: Vec<InputSource>,
    mapping: KeyMapping,
}

impl InputSourceManager {
    /// Load the catalog and the saved mapping, dropping stale identifiers
    pub fn new(backend: Arc<dyn InputSourceBackend>, store: PreferenceStore) -> Self {
        let sources = backend.list_sources();
        let saved = store.load();

        let mut manager = Self {
            backend,
            store,
            sources,
            mapping: KeyMapping::default(),
        };

        for key in MonitoredKey::ALL {
            match saved.get(key) {
                Some(id) if manager.contains(id) => {
                    *manager.mapping.slot_mut(key) = Some(id.to_string());
                }
                Some(id) => {
                    warn!(%key, source_id = %id, "saved input source no longer available");
                }
                None => {}
            }
        }

        info!(
            path = ?manager.store.path(),
            sources = manager.sources.len(),
            left = ?manager.mapping.left,
            right = ?manager.mapping.right,
            "input source manager loaded"
        );
        manager
    }

    /// Selectable input sources, sorted by display name
    pub fn sources(&self) -> &[InputSource] {
        &self.sources
    }

    pub fn mapping(&self, key: MonitoredKey) -> Option<&str> {
        self.mapping.get(key)
    }

    pub fn mappings(&self) -> &KeyMapping {
        &self.mapping
    }

    /// Identifier of the input source currently active in the OS
    pub fn current_source_id(&self) -> Option<String> {
        self.backend.current_source_id()
    }

    fn contains(&self, id: &str) -> bool {
        self.sources.iter().any(|s| s.id == id)
    }

    /// Set or clear the source for `key`
    ///
    /// Returns whether the mapping changed. Unchanged values are not
    /// written back to disk.
    pub fn set_mapping(&mut self, key: MonitoredKey, source_id: Option<String>) -> Result<bool, MappingError> {
        if let Some(id) = &source_id {
            if !self.contains(id) {
                return Err(MappingError::UnknownSource(id.clone()));
            }
        }

        let slot = self.mapping.slot_mut(key);
        if *slot == source_id {
            return Ok(false);
        }
        *slot = source_id;

        info!(%key, source_id = ?self.mapping.get(key), "mapping changed");
        self.persist();
        Ok(true)
    }

    /// Reload the catalog and clear mappings whose source disappeared
    ///
    /// Returns the keys that were cleared.
    pub fn refresh_sources(&mut self) -> Vec<MonitoredKey> {
        self.sources = self.backend.list_sources();

        let mut cleared = Vec::new();
        for key in MonitoredKey::ALL {
            let stale = self.mapping.get(key).is_some_and(|id| !self.contains(id));
            if stale {
                *self.mapping.slot_mut(key) = None;
                cleared.push(key);
            }
        }

        if !cleared.is_empty() {
            warn!(?cleared, "cleared mappings for removed input sources");
            self.persist();
        }
        info!(sources = self.sources.len(), "input sources reloaded");
        cleared
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.mapping) {
            warn!(error = %e, "failed to save preferences");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input_source::testing::MockBackend;

    const US: &str = "com.apple.keylayout.US";
    const RUSSIAN: &str = "com.apple.keylayout.Russian";
    const GREEK: &str = "com.apple.keylayout.Greek";

    fn backend() -> Arc<MockBackend> {
        Arc::new(MockBackend::with_sources(&[
            (US, "U.S."),
            (RUSSIAN, "Russian"),
            (GREEK, "Greek"),
        ]))
    }

    fn store(dir: &tempfile::TempDir) -> PreferenceStore {
        PreferenceStore::new(dir.path().join("preferences.json"))
    }

    #[test]
    fn test_catalog_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let manager = InputSourceManager::new(backend(), store(&dir));
        let names: Vec<_> = manager.sources().iter().map(|s| s.localized_name.as_str()).collect();
        assert_eq!(names, ["Greek", "Russian", "U.S."]);
    }

    #[test]
    fn test_mapping_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();

        let mut manager = InputSourceManager::new(backend.clone(), store(&dir));
        assert_eq!(manager.set_mapping(MonitoredKey::Left, Some(US.to_string())), Ok(true));
        assert_eq!(manager.set_mapping(MonitoredKey::Right, Some(RUSSIAN.to_string())), Ok(true));
        drop(manager);

        let mut reloaded = InputSourceManager::new(backend, store(&dir));
        reloaded.refresh_sources();
        assert_eq!(reloaded.mapping(MonitoredKey::Left), Some(US));
        assert_eq!(reloaded.mapping(MonitoredKey::Right), Some(RUSSIAN));
    }

    #[test]
    fn test_stale_mapping_cleared_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();

        let mut manager = InputSourceManager::new(backend.clone(), store(&dir));
        manager.set_mapping(MonitoredKey::Left, Some(GREEK.to_string())).unwrap();
        drop(manager);

        backend.set_sources(&[(US, "U.S.")]);
        let reloaded = InputSourceManager::new(backend, store(&dir));
        assert_eq!(reloaded.mapping(MonitoredKey::Left), None);
    }

    #[test]
    fn test_refresh_clears_only_removed_source() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();

        let mut manager = InputSourceManager::new(backend.clone(), store(&dir));
        manager.set_mapping(MonitoredKey::Left, Some(US.to_string())).unwrap();
        manager.set_mapping(MonitoredKey::Right, Some(RUSSIAN.to_string())).unwrap();

        backend.set_sources(&[(US, "U.S."), (GREEK, "Greek")]);
        let cleared = manager.refresh_sources();

        assert_eq!(cleared, vec![MonitoredKey::Right]);
        assert_eq!(manager.mapping(MonitoredKey::Right), None);
        assert_eq!(manager.mapping(MonitoredKey::Left), Some(US));

        // The cleared value is persisted too
        let saved = store(&dir).load();
        assert_eq!(saved.right, None);
        assert_eq!(saved.left.as_deref(), Some(US));
    }

    #[test]
    fn test_unknown_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = InputSourceManager::new(backend(), store(&dir));

        let result = manager.set_mapping(MonitoredKey::Left, Some("com.example.Nope".to_string()));
        assert_eq!(result, Err(MappingError::UnknownSource("com.example.Nope".to_string())));
        assert_eq!(manager.mapping(MonitoredKey::Left), None);
    }

    #[test]
    fn test_clear_and_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = InputSourceManager::new(backend(), store(&dir));

        assert_eq!(manager.set_mapping(MonitoredKey::Right, None), Ok(false));
        assert!(!store(&dir).path().exists());

        manager.set_mapping(MonitoredKey::Right, Some(GREEK.to_string())).unwrap();
        assert_eq!(manager.set_mapping(MonitoredKey::Right, Some(GREEK.to_string())), Ok(false));
        assert_eq!(manager.set_mapping(MonitoredKey::Right, None), Ok(true));
        assert_eq!(store(&dir).load(), KeyMapping::default());
    }
}
