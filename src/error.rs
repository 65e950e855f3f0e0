//! Error types for the push session
//!
//! [`TransportError`] is what the transport raises; the session core classifies
//! it and absorbs it at the serializer boundary. [`ClientError`] covers the few
//! failures the facade does report: bad input, bad configuration, slow shutdown.

use crate::config::ConfigError;
use thiserror::Error;

/// User-error code meaning the MPN subsystem (or the inquired MPN) is not available
pub const MPN_UNAVAILABLE_CODE: i32 = 45;

/// User-error code meaning the inquired MPN is not active anymore
pub const MPN_NOT_ACTIVE_CODE: i32 = 46;

/// Errors raised by the transport client
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Server error {code}: {message}")]
    Server { code: i32, message: String },

    #[error("Request refused {code}: {message}")]
    User { code: i32, message: String },

    #[error("Subscription request on a closed session: {0}")]
    SubscriptionClosed(String),

    #[error("Connection problems: {0}")]
    Connection(String),
}

/// Coarse classification driving how a failed request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Session is gone; abort, the reconnection loop recovers
    ConnectionClosed,
    /// Rejected by server logic; log and drop
    ServerRejected,
    /// Refused for protocol or semantic reasons; log and drop
    UserRejected,
    /// Connectivity problem; log and drop
    Transport,
}

impl TransportError {
    pub fn connection_closed<S: Into<String>>(message: S) -> Self {
        Self::ConnectionClosed(message.into())
    }

    pub fn server<S: Into<String>>(code: i32, message: S) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    pub fn user<S: Into<String>>(code: i32, message: S) -> Self {
        Self::User {
            code,
            message: message.into(),
        }
    }

    pub fn subscription_closed<S: Into<String>>(message: S) -> Self {
        Self::SubscriptionClosed(message.into())
    }

    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::ConnectionClosed(_) | TransportError::SubscriptionClosed(_) => {
                ErrorClass::ConnectionClosed
            }
            TransportError::Server { .. } => ErrorClass::ServerRejected,
            TransportError::User { .. } => ErrorClass::UserRejected,
            TransportError::Connection(_) => ErrorClass::Transport,
        }
    }

    /// Code of a user-level refusal, if this is one
    pub fn user_code(&self) -> Option<i32> {
        match self {
            TransportError::User { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The session this request was issued on no longer exists
    pub fn is_session_gone(&self) -> bool {
        self.class() == ErrorClass::ConnectionClosed
    }

    /// The inquired MPN no longer exists on the server
    pub fn is_mpn_gone(&self) -> bool {
        matches!(
            self.user_code(),
            Some(MPN_UNAVAILABLE_CODE) | Some(MPN_NOT_ACTIVE_CODE)
        )
    }

    /// The server has no MPN subsystem for this session
    pub fn is_mpn_unavailable(&self) -> bool {
        self.user_code() == Some(MPN_UNAVAILABLE_CODE)
    }
}

/// Errors reported by the facade and the binary
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session worker did not stop within {secs}s")]
    ShutdownTimeout { secs: u64 },
}

/// Result type for facade operations
pub type ClientResult<T> = Result<T, ClientError>;
