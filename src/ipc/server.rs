//! Unix domain socket server for IPC
//!
//! This is the surface a menu bar front end talks to: it lists input
//! sources, edits the Command key mappings, reloads the catalog and
//! pushes daemon events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::SwitchEvent;
use crate::hotkey::{ensure_accessibility, EventListener, MonitoredKey};
use crate::input_source::InputSource;
use crate::mapping::{MappingError, SharedManager};

use super::protocol::{read_message, write_message, DaemonStatus, Request, Response};

/// Services the server acts on, shared by every client handler
pub struct ServerContext {
    manager: SharedManager,
    event_listener: Arc<EventListener>,
    event_tx: broadcast::Sender<SwitchEvent>,
    start_time: Instant,
}

impl ServerContext {
    pub fn new(
        manager: SharedManager,
        event_listener: Arc<EventListener>,
        event_tx: broadcast::Sender<SwitchEvent>,
    ) -> Self {
        Self {
            manager,
            event_listener,
            event_tx,
            start_time: Instant::now(),
        }
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    pub async fn process_request(&self, request: Request) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let manager = self.manager.read().await;
                let mappings = manager.mappings();
                let status = DaemonStatus {
                    listener_running: self.event_listener.is_running(),
                    current_source_id: manager.current_source_id(),
                    left_source_id: mappings.left.clone(),
                    right_source_id: mappings.right.clone(),
                    source_count: manager.sources().len(),
                    uptime_secs: self.start_time.elapsed().as_secs(),
                    ..DaemonStatus::default()
                };
                (Response::Status(status), false)
            }

            // Pickers list on open, so the catalog is fresh each time
            Request::ListSources => {
                let (sources, _) = self.reload_sources().await;
                (Response::Sources { sources }, false)
            }

            Request::GetMappings => {
                let manager = self.manager.read().await;
                let mappings = manager.mappings();
                let response = Response::Mappings {
                    left: mappings.left.clone(),
                    right: mappings.right.clone(),
                };
                (response, false)
            }

            Request::SetMapping { key, source_id } => {
                let result = self
                    .manager
                    .write()
                    .await
                    .set_mapping(key, source_id.clone());

                match result {
                    Ok(changed) => {
                        if changed {
                            let _ = self.event_tx.send(SwitchEvent::MappingChanged {
                                key,
                                source_id: source_id.clone(),
                            });
                        }
                        let response = Response::MappingUpdated {
                            key,
                            source_id,
                            changed,
                        };
                        (response, false)
                    }
                    Err(e @ MappingError::UnknownSource(_)) => {
                        (Response::error("unknown_source", e), false)
                    }
                }
            }

            Request::ReloadSources => {
                let (sources, cleared) = self.reload_sources().await;
                let count = sources.len();
                (Response::SourcesReloaded { count, cleared }, false)
            }

            Request::StartListener => {
                if self.event_listener.is_running() {
                    return (Response::ListenerStarted, false);
                }

                let listener = Arc::clone(&self.event_listener);
                let started = tokio::task::spawn_blocking(move || {
                    ensure_accessibility(true);
                    listener.start()
                })
                .await;

                match started {
                    Ok(Ok(())) => {
                        info!("event listener started on request");
                        let _ = self.event_tx.send(SwitchEvent::ListenerStarted);
                        (Response::ListenerStarted, false)
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "event listener failed to start");
                        (Response::error("listener_error", e), false)
                    }
                    Err(e) => (Response::error("internal", e), false),
                }
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Re-read the catalog from the OS and announce cleared mappings
    async fn reload_sources(&self) -> (Vec<InputSource>, Vec<MonitoredKey>) {
        let mut manager = self.manager.write().await;
        let cleared = manager.refresh_sources();
        let sources = manager.sources().to_vec();
        drop(manager);

        for key in &cleared {
            let _ = self.event_tx.send(SwitchEvent::MappingChanged {
                key: *key,
                source_id: None,
            });
        }
        let _ = self.event_tx.send(SwitchEvent::SourcesReloaded {
            count: sources.len(),
            cleared: cleared.clone(),
        });
        (sources, cleared)
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    context: Arc<ServerContext>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one left by a previous run
    pub fn new(socket_path: &Path, context: ServerContext) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            context: Arc::new(context),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let context = Arc::clone(&self.context);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, context) => {
                                if let Err(e) = result {
                                    warn!(error = %e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(error = %e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
///
/// Requests are read on a separate task so that a pushed event never
/// interrupts a partially read frame.
async fn handle_client(stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (request_tx, mut request_rx) = mpsc::channel::<Request>(8);

    let reader_task = tokio::spawn(async move {
        loop {
            match read_message::<_, Request>(&mut reader).await {
                Ok(Some(request)) => {
                    if request_tx.send(request).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("client disconnected");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "failed to read request");
                    break;
                }
            }
        }
    });

    let mut events: Option<broadcast::Receiver<SwitchEvent>> = None;
    let result = loop {
        tokio::select! {
            request = request_rx.recv() => {
                let Some(request) = request else { break Ok(()) };
                debug!(?request, "received request");

                let (response, subscribe) = context.process_request(request).await;
                if subscribe && events.is_none() {
                    debug!("client subscribed to notifications");
                    events = Some(context.event_tx.subscribe());
                }
                if let Err(e) = write_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(event) => {
                        if let Err(e) = write_message(&mut writer, &Response::Event { event }).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                }
            }
        }
    };

    reader_task.abort();
    result
}

/// Next event for a subscribed client; never resolves when unsubscribed
async fn next_event(
    events: &mut Option<broadcast::Receiver<SwitchEvent>>,
) -> Result<SwitchEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
