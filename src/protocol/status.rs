//! Public connection status projected from controller and transport events
//!
//! The numeric codes are part of the external contract and must stay stable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Six-valued connection status delivered to the status listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// No session, either never opened or deliberately closed
    Disconnected,
    /// An open attempt is in flight
    Connecting,
    /// Session established over a streaming connection
    Streaming,
    /// Session established over a polling connection
    Polling,
    /// Session established but the server has gone quiet
    Stalled,
    /// Last open attempt failed, waiting before the next one
    Waiting,
}

impl ConnectionStatus {
    pub const ALL: [ConnectionStatus; 6] = [
        ConnectionStatus::Disconnected,
        ConnectionStatus::Connecting,
        ConnectionStatus::Streaming,
        ConnectionStatus::Polling,
        ConnectionStatus::Stalled,
        ConnectionStatus::Waiting,
    ];

    /// Stable numeric code of this status
    pub fn code(self) -> u8 {
        match self {
            ConnectionStatus::Disconnected => 0,
            ConnectionStatus::Connecting => 1,
            ConnectionStatus::Streaming => 2,
            ConnectionStatus::Polling => 3,
            ConnectionStatus::Stalled => 4,
            ConnectionStatus::Waiting => 5,
        }
    }

    /// Inverse of [`ConnectionStatus::code`]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Status reported once a session has started
    pub fn for_session(is_polling: bool) -> Self {
        if is_polling {
            ConnectionStatus::Polling
        } else {
            ConnectionStatus::Streaming
        }
    }

    /// True for the statuses that imply a live session
    pub fn is_session_active(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Streaming | ConnectionStatus::Polling | ConnectionStatus::Stalled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Streaming => "STREAMING",
            ConnectionStatus::Polling => "POLLING",
            ConnectionStatus::Stalled => "STALLED",
            ConnectionStatus::Waiting => "WAITING",
        }
    }
}

/// The single external observer of connection status
pub trait StatusListener: Send + Sync {
    fn on_status_change(&self, status: ConnectionStatus);
}

impl<F> StatusListener for F
where
    F: Fn(ConnectionStatus) + Send + Sync,
{
    fn on_status_change(&self, status: ConnectionStatus) {
        self(status)
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Disconnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
