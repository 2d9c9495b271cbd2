//! Layout switcher
//!
//! Receives tapped keys from the tap dispatcher and activates the input
//! source mapped to each. Japanese input methods and the ABC layout do not
//! reliably activate through direct selection, so those are switched by
//! posting the dedicated JIS Kana / Eisu key instead.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::{InputSourceBackend, SourceError};
use crate::events::SwitchEvent;
use crate::hotkey::{codes, KeyCode, MonitoredKey};
use crate::mapping::SharedManager;

/// Key press that replaces direct selection for `source_id`, if any
pub fn fallback_key_for(source_id: &str) -> Option<KeyCode> {
    if source_id.contains(".Japanese") {
        Some(codes::JIS_KANA)
    } else if source_id.contains(".ABC") {
        Some(codes::JIS_EISU)
    } else {
        None
    }
}

/// How an input source was activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum ActivationPath {
    /// Direct selection through the input source registry
    Selection,
    /// Synthetic press of a dedicated key
    KeyPress { key_code: KeyCode },
}

/// Activates the input source mapped to a tapped Command key
pub struct LayoutSwitcher {
    backend: Arc<dyn InputSourceBackend>,
    manager: SharedManager,
    event_tx: broadcast::Sender<SwitchEvent>,
}

impl LayoutSwitcher {
    pub fn new(
        backend: Arc<dyn InputSourceBackend>,
        manager: SharedManager,
        event_tx: broadcast::Sender<SwitchEvent>,
    ) -> Self {
        Self {
            backend,
            manager,
            event_tx,
        }
    }

    /// Process tapped keys until the sending side is dropped
    pub async fn run(&self, mut switch_rx: mpsc::Receiver<MonitoredKey>) {
        info!("layout switcher started");

        while let Some(key) = switch_rx.recv().await {
            self.activate(key).await;
        }

        info!("layout switcher stopped");
    }

    /// Switch to the input source configured for `key`
    ///
    /// Returns `None` when no source is mapped. Failures are logged and
    /// broadcast as events; `run` discards the result.
    pub async fn activate(&self, key: MonitoredKey) -> Option<Result<ActivationPath, SourceError>> {
        let Some(source_id) = self.manager.read().await.mapping(key).map(str::to_owned) else {
            debug!(%key, "no input source mapped");
            return None;
        };

        let result = self.activate_source(&source_id);
        let event = match &result {
            Ok(path) => {
                info!(%key, source_id = %source_id, ?path, "input source switched");
                SwitchEvent::LayoutSwitched {
                    key,
                    source_id,
                    path: *path,
                }
            }
            Err(e) => {
                warn!(%key, source_id = %source_id, error = %e, "input source switch failed");
                SwitchEvent::SwitchFailed {
                    key,
                    source_id,
                    reason: e.to_string(),
                }
            }
        };
        let _ = self.event_tx.send(event);

        Some(result)
    }

    /// Activate `source_id`, preferring the fallback key press when one applies
    pub fn activate_source(&self, source_id: &str) -> Result<ActivationPath, SourceError> {
        if let Some(key_code) = fallback_key_for(source_id) {
            self.backend.post_key_press(key_code)?;
            return Ok(ActivationPath::KeyPress { key_code });
        }

        self.backend.select_source(source_id)?;
        Ok(ActivationPath::Selection)
    }
}
