//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::events::SwitchEvent;
use crate::hotkey::MonitoredKey;
use crate::input_source::InputSource;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from a UI client to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Re-read and list selectable input sources
    ListSources,

    /// Read the source assigned to each Command key
    GetMappings,

    /// Assign a source to a key, or clear it with `null`
    SetMapping {
        key: MonitoredKey,
        source_id: Option<String>,
    },

    /// Re-enumerate input sources from the OS
    ReloadSources,

    /// Prompt for permission and try installing the event tap again
    StartListener,

    /// Subscribe to event notifications
    Subscribe,
}

/// Responses from the daemon to a UI client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    /// Selectable input sources, sorted by display name
    Sources { sources: Vec<InputSource> },

    /// Source assigned to each Command key
    Mappings {
        left: Option<String>,
        right: Option<String>,
    },

    /// Result of `set_mapping`
    MappingUpdated {
        key: MonitoredKey,
        source_id: Option<String>,
        changed: bool,
    },

    /// Result of `reload_sources`
    SourcesReloaded {
        count: usize,
        cleared: Vec<MonitoredKey>,
    },

    /// The event tap is installed
    ListenerStarted,

    /// Subscription confirmed
    Subscribed,

    /// Pushed to subscribed clients
    Event { event: SwitchEvent },

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl ToString) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Whether the event tap is installed
    pub listener_running: bool,

    /// Input source active in the OS right now
    pub current_source_id: Option<String>,

    /// Source assigned to Left Command
    pub left_source_id: Option<String>,

    /// Source assigned to Right Command
    pub right_source_id: Option<String>,

    /// Number of selectable input sources
    pub source_count: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            listener_running: false,
            current_source_id: None,
            left_source_id: None,
            right_source_id: None,
            source_count: 0,
            uptime_secs: 0,
        }
    }
}

/// Read one length-prefixed JSON message; `None` on clean end of stream
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        bail!("message too large: {} bytes", len);
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(serde_json::from_slice(&msg_buf)?))
}

/// Write one length-prefixed JSON message
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = Request::SetMapping {
            key: MonitoredKey::Left,
            source_id: Some("com.apple.keylayout.US".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("set_mapping"));
        assert!(json.contains("\"key\":\"left\""));
    }

    #[test]
    fn test_clear_mapping_request() {
        let json = r#"{"type":"set_mapping","key":"right","source_id":null}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            Request::SetMapping {
                key: MonitoredKey::Right,
                source_id: None
            }
        );
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.contains("listener_running"));

        let resp = Response::Event {
            event: SwitchEvent::ListenerStarted,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"type\":\"event\""));
        assert!(json.contains("listener_started"));
    }

    #[tokio::test]
    async fn test_framing() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_message(&mut client, &Request::ReloadSources).await.unwrap();
        write_message(&mut client, &Request::Ping).await.unwrap();
        drop(client);

        let first: Option<Request> = read_message(&mut server).await.unwrap();
        let second: Option<Request> = read_message(&mut server).await.unwrap();
        let end: Option<Request> = read_message(&mut server).await.unwrap();
        assert_eq!(first, Some(Request::ReloadSources));
        assert_eq!(second, Some(Request::Ping));
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = (MAX_MESSAGE_LEN as u32 + 1).to_le_bytes();
        client.write_all(&len).await.unwrap();

        let result: Result<Option<Request>> = read_message(&mut server).await;
        assert!(result.is_err());
    }
}
