//! cmdswitchd: switch keyboard input sources with the Command keys
//!
//! Tapping Left Command alone activates one input source, tapping Right
//! Command alone activates another. Command used as a shortcut modifier
//! is ignored.
//!
//! The daemon provides:
//! - Global key observation via CGEventTap on a dedicated thread
//! - Tap detection for the two Command keys
//! - Input source switching through Text Input Source Services
//! - IPC server for a menu bar front end to edit the mappings

mod config;
mod events;
mod hotkey;
mod input_source;
mod ipc;
mod lifecycle;
mod mapping;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::SwitchEvent;
use crate::hotkey::{ensure_accessibility, EventListener};
use crate::input_source::LayoutSwitcher;
use crate::ipc::{Server, ServerContext};
use crate::lifecycle::ShutdownSignal;
use crate::mapping::{InputSourceManager, PreferenceStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "cmdswitchd starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.preferences_path, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Event tap thread -> layout switcher
    let (switch_tx, switch_rx) = mpsc::channel(32);
    // Switcher and IPC -> subscribers
    let (event_tx, _event_rx) = broadcast::channel::<SwitchEvent>(64);

    let backend = input_source::system_backend();
    let store = PreferenceStore::new(&config.preferences_path);
    let manager = Arc::new(RwLock::new(InputSourceManager::new(backend.clone(), store)));

    let switcher = LayoutSwitcher::new(backend, Arc::clone(&manager), event_tx.clone());
    let event_listener = Arc::new(EventListener::new(switch_tx));

    ensure_accessibility(true);
    match event_listener.start() {
        Ok(()) => {
            info!("event listener started");
            let _ = event_tx.send(SwitchEvent::ListenerStarted);
        }
        Err(e) => {
            error!(error = %e, "failed to start event listener");
            warn!("continuing without Command taps - grant Accessibility and send start_listener");
        }
    }

    let context = ServerContext::new(
        Arc::clone(&manager),
        Arc::clone(&event_listener),
        event_tx.clone(),
    );
    let server = Server::new(&config.socket_path, context)?;

    let mut log_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        // Activate input sources for detected taps
        _ = switcher.run(switch_rx) => {
            info!("layout switcher exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "IPC server error");
            }
        }

        _ = async {
            loop {
                match log_rx.recv().await {
                    Ok(event) => info!(%event, "event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event log receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event log exited");
        }

        // Wait for shutdown signal
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    event_listener.stop();
    server.shutdown().await;

    info!("cmdswitchd stopped");

    Ok(())
}
