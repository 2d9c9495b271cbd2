//! Events broadcast by the daemon
//!
//! Emitted by the layout switcher and the IPC server and pushed to
//! subscribed IPC clients.

use serde::{Deserialize, Serialize};

use crate::hotkey::MonitoredKey;
use crate::input_source::ActivationPath;

/// Something observable happened in the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchEvent {
    /// A Command tap activated an input source
    LayoutSwitched {
        key: MonitoredKey,
        source_id: String,
        path: ActivationPath,
    },

    /// A Command tap could not activate its input source
    SwitchFailed {
        key: MonitoredKey,
        source_id: String,
        reason: String,
    },

    /// The source assigned to a key was set or cleared
    MappingChanged {
        key: MonitoredKey,
        source_id: Option<String>,
    },

    /// The catalog was reloaded
    SourcesReloaded {
        /// Number of selectable sources
        count: usize,
        /// Keys whose source disappeared
        cleared: Vec<MonitoredKey>,
    },

    /// The event tap was installed
    ListenerStarted,
}

impl std::fmt::Display for SwitchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchEvent::LayoutSwitched { key, source_id, .. } => {
                write!(f, "LAYOUT_SWITCHED ({} -> {})", key, source_id)
            }
            SwitchEvent::SwitchFailed { key, source_id, reason } => {
                write!(f, "SWITCH_FAILED ({} -> {}: {})", key, source_id, reason)
            }
            SwitchEvent::MappingChanged { key, source_id } => match source_id {
                Some(id) => write!(f, "MAPPING_CHANGED ({} -> {})", key, id),
                None => write!(f, "MAPPING_CHANGED ({} -> not set)", key),
            },
            SwitchEvent::SourcesReloaded { count, cleared } => {
                write!(f, "SOURCES_RELOADED ({} sources, {} cleared)", count, cleared.len())
            }
            SwitchEvent::ListenerStarted => write!(f, "LISTENER_STARTED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SwitchEvent::LayoutSwitched {
            key: MonitoredKey::Right,
            source_id: "com.apple.keylayout.ABC".to_string(),
            path: ActivationPath::KeyPress { key_code: 102 },
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("layout_switched"));
        assert!(json.contains("\"key\":\"right\""));
        assert!(json.contains("\"via\":\"key_press\""));
        assert!(json.contains("102"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"mapping_changed","key":"left","source_id":null}"#;
        let event: SwitchEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            SwitchEvent::MappingChanged {
                key: MonitoredKey::Left,
                source_id: None
            }
        );
    }

    #[test]
    fn test_display() {
        let event = SwitchEvent::SourcesReloaded {
            count: 4,
            cleared: vec![MonitoredKey::Left],
        };
        assert_eq!(event.to_string(), "SOURCES_RELOADED (4 sources, 1 cleared)");
    }
}
