//! Session errors
//!
//! The taxonomy mirrors how each failure is handled, not where it came
//! from: recoverable classes are retried inside the session with backoff,
//! per-transport violations tear down one transport, and only `Fatal`
//! (and a crypto failure during setup) surfaces to the application.

use crate::security::CryptoError;
use crate::sync::DocError;

/// Errors produced by the session and the rendezvous client.
#[derive(Debug)]
pub enum SessionError {
    /// Malformed identifier or missing required field.
    InvalidArgument(String),
    /// Unknown or expired share code, or no such resource.
    NotFound(String),
    /// The rendezvous rejected us for exceeding the per-IP budget.
    /// Non-fatal: back off and retry.
    RateLimited,
    /// Network or storage hiccup; retry with backoff.
    Transient(String),
    /// A cryptographic operation failed. Indistinguishable on purpose;
    /// at the handshake boundary this surfaces as "incorrect password".
    CryptoFailure,
    /// The remote broke the wire protocol. Fatal to that transport,
    /// never retried on it.
    ProtocolViolation(String),
    /// Misconfiguration or corrupted local state. Fatal to the session.
    Fatal(String),
    /// The session is not running.
    NotRunning,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InvalidArgument(e) => write!(f, "invalid argument: {}", e),
            SessionError::NotFound(e) => write!(f, "not found: {}", e),
            SessionError::RateLimited => write!(f, "rate limited by rendezvous"),
            SessionError::Transient(e) => write!(f, "transient failure: {}", e),
            SessionError::CryptoFailure => write!(f, "incorrect password"),
            SessionError::ProtocolViolation(e) => write!(f, "protocol violation: {}", e),
            SessionError::Fatal(e) => write!(f, "fatal session error: {}", e),
            SessionError::NotRunning => write!(f, "session is not running"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<CryptoError> for SessionError {
    fn from(_: CryptoError) -> Self {
        SessionError::CryptoFailure
    }
}

impl From<DocError> for SessionError {
    fn from(e: DocError) -> Self {
        SessionError::Fatal(e.to_string())
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        SessionError::Transient(e.to_string())
    }
}

impl SessionError {
    /// Whether the session may retry the operation later.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SessionError::RateLimited | SessionError::Transient(_))
    }
}
