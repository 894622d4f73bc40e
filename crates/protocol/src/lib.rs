//! Status push protocol: the literals exchanged over a session's status socket.
//!
//! The server pushes bare text frames (no envelope) as the verification
//! session moves through its lifecycle. Anything the client sends is answered
//! with [`NOT_SUPPORTED`] and otherwise ignored.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Protocol version reported by the health endpoint.
pub const PROTOCOL_VERSION: u32 = 2;

/// Reply sent for every client-originated frame.
pub const NOT_SUPPORTED: &str = "NOT SUPPORTED";

/// Axum route pattern for the status socket, one per session token.
pub const STATUS_ROUTE: &str = "/api/v2/status/{token}";

/// Build the concrete status socket path for `token`.
pub fn status_path(token: &str) -> String {
    STATUS_ROUTE.replace("{token}", token)
}

// ── Events ───────────────────────────────────────────────────────────────────

/// A state-transition notification pushed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusEvent {
    /// A token connected to the verification server.
    Connected,
    /// The verification completed.
    Done,
    /// The token rejected the verification.
    Cancelled,
    /// The session expired before completing.
    Timeout,
}

impl StatusEvent {
    pub const ALL: [StatusEvent; 4] = [
        StatusEvent::Connected,
        StatusEvent::Done,
        StatusEvent::Cancelled,
        StatusEvent::Timeout,
    ];

    /// The exact text frame pushed for this event.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusEvent::Connected => "CONNECTED",
            StatusEvent::Done => "DONE",
            StatusEvent::Cancelled => "CANCELLED",
            StatusEvent::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown status event: {0:?}")]
    UnknownEvent(String),
}

impl FromStr for StatusEvent {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusEvent::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownEvent(s.to_string()))
    }
}
