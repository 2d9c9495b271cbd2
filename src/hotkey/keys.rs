//! Key code definitions for the two monitored Command keys
//!
//! Provides the macOS virtual key codes the daemon cares about, the
//! modifier state decoded from `FlagsChanged` events and the
//! `MonitoredKey` identity used throughout the switching pipeline.

use serde::{Deserialize, Serialize};

/// A macOS virtual key code (`CGKeyCode`)
pub type KeyCode = u16;

/// Virtual key codes from the macOS HIToolbox `Events.h` table
pub mod codes {
    use super::KeyCode;

    /// Left Command key
    pub const LEFT_COMMAND: KeyCode = 55;
    /// Right Command key
    pub const RIGHT_COMMAND: KeyCode = 54;
    /// JIS Kana key, selects the Japanese input method
    pub const JIS_KANA: KeyCode = 104;
    /// JIS Eisu key, selects the ABC layout
    pub const JIS_EISU: KeyCode = 102;

    pub const LEFT_SHIFT: KeyCode = 56;
    pub const RIGHT_SHIFT: KeyCode = 60;
    pub const LEFT_CONTROL: KeyCode = 59;
    pub const RIGHT_CONTROL: KeyCode = 62;
    pub const LEFT_OPTION: KeyCode = 58;
    pub const RIGHT_OPTION: KeyCode = 61;
    pub const CAPS_LOCK: KeyCode = 57;
    pub const FUNCTION: KeyCode = 63;
}

/// Device-dependent Command bits reported with `FlagsChanged` events
///
/// `CGEventFlags` has no names for these (`NX_DEVICELCMDKEYMASK` and
/// `NX_DEVICERCMDKEYMASK` in IOKit).
pub mod device_flags {
    /// Left Command is held
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    /// Right Command is held
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
}

/// Modifier key flag masks from macOS CGEventFlags
#[cfg(target_os = "macos")]
pub mod flags {
    use core_graphics::event::CGEventFlags;

    pub const CAPS_LOCK: CGEventFlags = CGEventFlags::CGEventFlagAlphaShift;
    pub const SHIFT: CGEventFlags = CGEventFlags::CGEventFlagShift;
    pub const CONTROL: CGEventFlags = CGEventFlags::CGEventFlagControl;
    /// Option/Alt key modifier flag
    pub const OPTION: CGEventFlags = CGEventFlags::CGEventFlagAlternate;
    pub const COMMAND: CGEventFlags = CGEventFlags::CGEventFlagCommand;
    pub const FUNCTION: CGEventFlags = CGEventFlags::CGEventFlagSecondaryFn;
}

/// Which modifier keys a `FlagsChanged` event reports as held
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub caps_lock: bool,
    pub shift: bool,
    pub control: bool,
    pub option: bool,
    pub function: bool,
    /// Either Command key is held
    pub command: bool,
    /// Per-side Command bits, absent on some synthetic or remote input
    pub left_command: bool,
    pub right_command: bool,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
impl ModifierState {
    /// Create a new ModifierState from CGEventFlags
    #[cfg(target_os = "macos")]
    pub fn from_flags(event_flags: core_graphics::event::CGEventFlags) -> Self {
        let raw = event_flags.bits();
        Self {
            caps_lock: event_flags.contains(flags::CAPS_LOCK),
            shift: event_flags.contains(flags::SHIFT),
            control: event_flags.contains(flags::CONTROL),
            option: event_flags.contains(flags::OPTION),
            function: event_flags.contains(flags::FUNCTION),
            command: event_flags.contains(flags::COMMAND),
            left_command: raw & device_flags::LEFT_COMMAND != 0,
            right_command: raw & device_flags::RIGHT_COMMAND != 0,
        }
    }

    /// Whether the modifier with virtual key `code` is now held
    ///
    /// Command keys use their per-side bit when the event carries one, so
    /// releasing one Command key while the other is down reads as a
    /// release. Without per-side bits the shared Command flag decides.
    pub fn is_pressed(&self, code: KeyCode) -> bool {
        match code {
            codes::LEFT_COMMAND | codes::RIGHT_COMMAND => self.is_command_pressed(code),
            codes::LEFT_SHIFT | codes::RIGHT_SHIFT => self.shift,
            codes::LEFT_CONTROL | codes::RIGHT_CONTROL => self.control,
            codes::LEFT_OPTION | codes::RIGHT_OPTION => self.option,
            codes::CAPS_LOCK => self.caps_lock,
            codes::FUNCTION => self.function,
            _ => self.command,
        }
    }

    fn is_command_pressed(&self, code: KeyCode) -> bool {
        if !self.command {
            return false;
        }
        if !self.left_command && !self.right_command {
            return true;
        }
        if code == codes::LEFT_COMMAND {
            self.left_command
        } else {
            self.right_command
        }
    }
}

/// One of the two physical Command keys tracked by the tap detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoredKey {
    Left,
    Right,
}

impl MonitoredKey {
    /// Both monitored keys, left first
    pub const ALL: [MonitoredKey; 2] = [MonitoredKey::Left, MonitoredKey::Right];

    /// Map a raw key code to a monitored key, if it is one
    pub fn from_key_code(code: KeyCode) -> Option<Self> {
        match code {
            codes::LEFT_COMMAND => Some(Self::Left),
            codes::RIGHT_COMMAND => Some(Self::Right),
            _ => None,
        }
    }
}

impl std::fmt::Display for MonitoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitoredKey::Left => write!(f, "Left Command"),
            MonitoredKey::Right => write!(f, "Right Command"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::detector::TapDetector;

    fn command(left: bool, right: bool) -> ModifierState {
        ModifierState {
            command: true,
            left_command: left,
            right_command: right,
            ..ModifierState::default()
        }
    }

    #[test]
    fn test_key_code_mapping() {
        assert_eq!(MonitoredKey::from_key_code(55), Some(MonitoredKey::Left));
        assert_eq!(MonitoredKey::from_key_code(54), Some(MonitoredKey::Right));
        assert_eq!(MonitoredKey::from_key_code(0), None);
        assert_eq!(MonitoredKey::from_key_code(codes::JIS_KANA), None);
    }

    #[test]
    fn test_command_per_side_bits() {
        let left_only = command(true, false);
        assert!(left_only.is_pressed(codes::LEFT_COMMAND));
        assert!(!left_only.is_pressed(codes::RIGHT_COMMAND));

        let both = command(true, true);
        assert!(both.is_pressed(codes::LEFT_COMMAND));
        assert!(both.is_pressed(codes::RIGHT_COMMAND));

        // Right released while Left still held
        let right_released = command(true, false);
        assert!(!right_released.is_pressed(codes::RIGHT_COMMAND));
    }

    #[test]
    fn test_command_without_per_side_bits() {
        let state = command(false, false);
        assert!(state.is_pressed(codes::LEFT_COMMAND));
        assert!(state.is_pressed(codes::RIGHT_COMMAND));

        let released = ModifierState::default();
        assert!(!released.is_pressed(codes::LEFT_COMMAND));
        assert!(!released.is_pressed(codes::RIGHT_COMMAND));
    }

    #[test]
    fn test_stray_per_side_bit_without_command_is_release() {
        let state = ModifierState {
            left_command: true,
            ..ModifierState::default()
        };
        assert!(!state.is_pressed(codes::LEFT_COMMAND));
    }

    #[test]
    fn test_tap_without_per_side_bits_fires() {
        let mut detector = TapDetector::new();
        let pressed = command(false, false).is_pressed(codes::LEFT_COMMAND);
        assert_eq!(detector.on_modifier_event(codes::LEFT_COMMAND, pressed), None);

        let released = ModifierState::default().is_pressed(codes::LEFT_COMMAND);
        assert_eq!(
            detector.on_modifier_event(codes::LEFT_COMMAND, released),
            Some(MonitoredKey::Left)
        );
    }

    #[test]
    fn test_other_modifiers() {
        let shift = ModifierState {
            shift: true,
            ..ModifierState::default()
        };
        assert!(shift.is_pressed(codes::LEFT_SHIFT));
        assert!(shift.is_pressed(codes::RIGHT_SHIFT));
        assert!(!shift.is_pressed(codes::LEFT_COMMAND));
        assert!(!command(true, false).is_pressed(codes::LEFT_SHIFT));

        let option = ModifierState {
            option: true,
            ..ModifierState::default()
        };
        assert!(option.is_pressed(codes::RIGHT_OPTION));
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_from_flags() {
        use core_graphics::event::CGEventFlags;

        // Shared Command mask alone
        let state = ModifierState::from_flags(CGEventFlags::from_bits_truncate(0x0010_0000));
        assert!(state.command);
        assert!(!state.left_command && !state.right_command);
        assert!(state.is_pressed(codes::LEFT_COMMAND));

        let state = ModifierState::from_flags(CGEventFlags::from_bits_truncate(0x0010_0008));
        assert!(state.is_pressed(codes::LEFT_COMMAND));
        assert!(!state.is_pressed(codes::RIGHT_COMMAND));

        let state = ModifierState::from_flags(CGEventFlags::CGEventFlagShift);
        assert!(state.is_pressed(codes::LEFT_SHIFT));
        assert!(!state.is_pressed(codes::LEFT_COMMAND));
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&MonitoredKey::Right).unwrap();
        assert_eq!(json, "\"right\"");
        let key: MonitoredKey = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(key, MonitoredKey::Left);
    }
}
