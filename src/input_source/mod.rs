//! Input source catalog and selection
//!
//! Wraps the OS keyboard input source registry behind the
//! [`InputSourceBackend`] trait and provides the layout switcher that
//! turns a detected Command tap into an input source change.

#[cfg(target_os = "macos")]
mod macos;
mod switcher;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hotkey::KeyCode;

pub use switcher::{ActivationPath, LayoutSwitcher};

/// A selectable keyboard layout or input method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputSource {
    /// Stable identifier, e.g. `com.apple.keylayout.US`
    pub id: String,
    /// Display name in the user's language
    pub localized_name: String,
}

impl InputSource {
    pub fn new(id: impl Into<String>, localized_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            localized_name: localized_name.into(),
        }
    }
}

/// Sort sources by display name, case-insensitively ascending
pub fn sort_catalog(sources: &mut [InputSource]) {
    sources.sort_by_cached_key(|s| s.localized_name.to_lowercase());
}

/// Errors reported by an input source backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("input source not found: {0}")]
    NotFound(String),

    #[error("input source selection failed with status {0}")]
    SelectFailed(i32),

    #[error("failed to post synthetic key event")]
    EventPost,

    #[error("input sources are not supported on this platform")]
    Unsupported,
}

/// Access to the OS input source registry
pub trait InputSourceBackend: Send + Sync {
    /// Selectable keyboard layouts and input methods, sorted by display name
    fn list_sources(&self) -> Vec<InputSource>;

    /// Identifier of the currently active keyboard input source
    fn current_source_id(&self) -> Option<String>;

    /// Make the source with `id` the active input source
    fn select_source(&self, id: &str) -> Result<(), SourceError>;

    /// Synthesize a press and release of `code` with no modifiers
    fn post_key_press(&self, code: KeyCode) -> Result<(), SourceError>;
}

/// Backend for platforms without an input source registry
#[cfg_attr(target_os = "macos", allow(dead_code))]
#[derive(Debug, Default)]
pub struct NullBackend;

impl InputSourceBackend for NullBackend {
    fn list_sources(&self) -> Vec<InputSource> {
        Vec::new()
    }

    fn current_source_id(&self) -> Option<String> {
        None
    }

    fn select_source(&self, _id: &str) -> Result<(), SourceError> {
        Err(SourceError::Unsupported)
    }

    fn post_key_press(&self, _code: KeyCode) -> Result<(), SourceError> {
        Err(SourceError::Unsupported)
    }
}

/// The backend for the running platform
pub fn system_backend() -> Arc<dyn InputSourceBackend> {
    #[cfg(target_os = "macos")]
    {
        Arc::new(macos::TisBackend)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Arc::new(NullBackend)
    }
}
