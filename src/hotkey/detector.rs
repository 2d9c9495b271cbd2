//! Tap detection for the monitored Command keys
//!
//! A tap is a press and release of a monitored key with no other key
//! pressed in between. Holding Command as a shortcut modifier (Command-C)
//! delivers the shortcut key as `on_other_key_down` before the release,
//! which suppresses the switch.

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::keys::{KeyCode, MonitoredKey};

/// Receiver of raw keyboard events from the global event listener
///
/// Implementations run inline in the OS event delivery path and must
/// return without blocking.
pub trait KeyEventHandler {
    /// A modifier key changed its pressed state
    fn on_modifier_event(&mut self, key: KeyCode, is_now_pressed: bool);

    /// A non-modifier key was pressed
    fn on_other_key_down(&mut self, key: KeyCode);
}

/// Per-key tap state machine
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TapDetector {
    /// Monitored key currently held and still eligible to switch on release
    armed_key: Option<MonitoredKey>,
    /// A non-monitored key went down since `armed_key` was armed
    interrupted_by_other_key: bool,
}

impl TapDetector {
    /// Create a detector with nothing armed
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently armed key, if any
    pub fn armed_key(&self) -> Option<MonitoredKey> {
        self.armed_key
    }

    /// Whether another key interrupted the current arming
    pub fn is_interrupted(&self) -> bool {
        self.interrupted_by_other_key
    }

    /// Process a modifier press/release, returning the key to switch for
    pub fn on_modifier_event(&mut self, key: KeyCode, is_now_pressed: bool) -> Option<MonitoredKey> {
        let monitored = MonitoredKey::from_key_code(key)?;

        if is_now_pressed {
            // The most recent press wins, even over the other Command key
            self.armed_key = Some(monitored);
            self.interrupted_by_other_key = false;
            trace!(key = %monitored, "armed");
            return None;
        }

        if self.armed_key != Some(monitored) {
            return None;
        }

        self.armed_key = None;
        if self.interrupted_by_other_key {
            trace!(key = %monitored, "released after other key, ignoring");
            None
        } else {
            Some(monitored)
        }
    }

    /// Process a non-modifier key press
    pub fn on_other_key_down(&mut self, key: KeyCode) {
        if MonitoredKey::from_key_code(key).is_none() {
            self.interrupted_by_other_key = true;
        }
    }
}

/// Feeds a [`TapDetector`] and forwards each detected tap to the switcher
///
/// Sending uses `try_send` so the event tap thread never waits on the
/// receiver; commands that do not fit in the channel are dropped.
pub struct TapDispatcher {
    detector: TapDetector,
    switch_tx: mpsc::Sender<MonitoredKey>,
}

impl TapDispatcher {
    /// Create a dispatcher sending taps into `switch_tx`
    pub fn new(switch_tx: mpsc::Sender<MonitoredKey>) -> Self {
        Self {
            detector: TapDetector::new(),
            switch_tx,
        }
    }
}

impl KeyEventHandler for TapDispatcher {
    fn on_modifier_event(&mut self, key: KeyCode, is_now_pressed: bool) {
        let Some(tapped) = self.detector.on_modifier_event(key, is_now_pressed) else {
            return;
        };

        debug!(key = %tapped, "command key tapped");
        if let Err(e) = self.switch_tx.try_send(tapped) {
            warn!(key = %tapped, error = %e, "dropping switch command");
        }
    }

    fn on_other_key_down(&mut self, key: KeyCode) {
        let was_clean = !self.detector.is_interrupted();
        self.detector.on_other_key_down(key);

        if let Some(armed) = self.detector.armed_key() {
            if was_clean && self.detector.is_interrupted() {
                trace!(key = %armed, "tap interrupted by other key");
            }
        }
    }
}
