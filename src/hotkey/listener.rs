//! Global keyboard listener using macOS CGEventTap
//!
//! Observes system-wide `FlagsChanged` and `KeyDown` events and feeds them
//! to a [`KeyEventHandler`]. Runs on a dedicated thread with its own
//! CFRunLoop. The tap is listen-only: every event is passed through.
//!
//! All handler calls happen on that one thread, strictly in delivery
//! order, so handlers need no locking. A platform whose tap API delivers
//! concurrently would need a serializing queue in front of the handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::detector::TapDispatcher;
use super::keys::MonitoredKey;

/// Global listener that feeds the tap detector
pub struct EventListener {
    switch_tx: mpsc::Sender<MonitoredKey>,
    running: Arc<AtomicBool>,
}

impl EventListener {
    /// Create a listener whose detected taps are sent to `switch_tx`
    pub fn new(switch_tx: mpsc::Sender<MonitoredKey>) -> Self {
        Self {
            switch_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install the event tap and start delivering events
    ///
    /// Spawns the `event-tap` thread and waits until the tap is either
    /// installed or has failed to install. Failure leaves the listener
    /// stopped; calling `start` again retries once.
    pub fn start(&self) -> Result<(), ListenerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyRunning);
        }

        let dispatcher = TapDispatcher::new(self.switch_tx.clone());
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), ListenerError>>();

        let spawned = thread::Builder::new()
            .name("event-tap".to_string())
            .spawn(move || {
                info!("event tap thread started");

                let result = platform::run_event_loop(dispatcher, &running, &ready_tx);
                running.store(false, Ordering::SeqCst);

                if let Err(e) = result {
                    error!(error = %e, "event tap error");
                    let _ = ready_tx.send(Err(e));
                }
                info!("event tap thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(ListenerError::ThreadSpawn(e.to_string()));
        }

        match ready_rx.recv() {
            Ok(result) => result,
            Err(_) => Err(ListenerError::EventTapCreation),
        }
    }

    /// Stop the listener; the thread exits within one run loop slice
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur while installing the event tap
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("event listener is already running")]
    AlreadyRunning,

    #[error("failed to create event tap - check Accessibility permissions")]
    EventTapCreation,

    #[error("failed to create run loop source for event tap")]
    RunLoopSource,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("global keyboard events are not supported on this platform")]
    Unsupported,
}

#[cfg(target_os = "macos")]
mod platform {
    use std::cell::{Cell, RefCell};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventTapProxy, CGEventType, EventField,
    };
    use tracing::{info, trace, warn};

    use super::ListenerError;
    use crate::hotkey::detector::KeyEventHandler;
    use crate::hotkey::keys::{KeyCode, ModifierState};

    const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

    fn key_code(event: &CGEvent) -> KeyCode {
        event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as KeyCode
    }

    pub(super) fn run_event_loop<H: KeyEventHandler>(
        handler: H,
        running: &AtomicBool,
        ready_tx: &std::sync::mpsc::Sender<Result<(), ListenerError>>,
    ) -> Result<(), ListenerError> {
        // Declared before the tap so they outlive the callback borrowing them
        let handler = RefCell::new(handler);
        let disabled = Cell::new(false);

        // Runs inline in the system event path: must not block
        let callback = |_proxy: CGEventTapProxy, event_type: CGEventType, event: &CGEvent| {
            match event_type {
                CGEventType::FlagsChanged => {
                    let code = key_code(event);
                    let pressed = ModifierState::from_flags(event.get_flags()).is_pressed(code);
                    trace!(code, pressed, "flags changed");
                    handler.borrow_mut().on_modifier_event(code, pressed);
                }
                CGEventType::KeyDown => {
                    handler.borrow_mut().on_other_key_down(key_code(event));
                }
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    disabled.set(true);
                }
                _ => {}
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::FlagsChanged, CGEventType::KeyDown],
            callback,
        )
        .map_err(|_| ListenerError::EventTapCreation)?;

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| ListenerError::RunLoopSource)?;
        let run_loop = CFRunLoop::get_current();

        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }
        tap.enable();

        info!("event tap created and enabled");
        let _ = ready_tx.send(Ok(()));

        while running.load(Ordering::SeqCst) {
            unsafe {
                CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, false);
            }

            if disabled.replace(false) {
                warn!("event tap disabled by the system, re-enabling");
                tap.enable();
            }
        }

        unsafe {
            run_loop.remove_source(&run_loop_source, kCFRunLoopCommonModes);
        }
        info!("event tap removed");

        Ok(())
    }
}

#[cfg(not(target_os = "macos"))]
mod platform {
    use std::sync::atomic::AtomicBool;

    use super::ListenerError;
    use crate::hotkey::detector::KeyEventHandler;

    pub(super) fn run_event_loop<H: KeyEventHandler>(
        _handler: H,
        _running: &AtomicBool,
        _ready_tx: &std::sync::mpsc::Sender<Result<(), ListenerError>>,
    ) -> Result<(), ListenerError> {
        Err(ListenerError::Unsupported)
    }
}
