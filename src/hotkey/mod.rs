//! Hotkey module for global keyboard event listening
//!
//! Uses macOS CGEventTap to observe Command key presses and releases and
//! decide which of them are clean taps.

mod detector;
mod keys;
mod listener;
mod permissions;

pub use keys::{codes, KeyCode, MonitoredKey};
pub use listener::EventListener;
pub use permissions::ensure_accessibility;
