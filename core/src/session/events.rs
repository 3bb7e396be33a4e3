//! Session events for the application layer
//!
//! The session emits these on every status transition and on peer and
//! document activity. The status surface is intentionally small
//! (`disconnected → connecting → syncing → error` plus a last-error
//! string); anything more detailed belongs in the logs.

use cove_proto::PeerId;

/// Top-level session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not running. `stop()` from any state lands here.
    Idle,
    /// Deriving keys, opening the relay, announcing presence.
    Connecting,
    /// Live: discovering, authenticating and replicating with peers.
    Syncing,
    /// A fatal setup or I/O failure; the user must restart the session.
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Idle => write!(f, "disconnected"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Syncing => write!(f, "syncing"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// Events emitted by a running session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Status changed. `last_error` is set when the new status is `Error`.
    Status {
        status: SessionStatus,
        last_error: Option<String>,
    },
    /// A transport finished mutual authentication.
    PeerConnected { peer_id: PeerId },
    /// An authenticated transport went away (closure, violation, failure).
    PeerDisconnected { peer_id: PeerId },
    /// A remote update or snapshot was merged into the local document.
    DocUpdated { origin: PeerId },
    /// The rendezvous is rate limiting us; announcements are paused until
    /// the backoff expires. Informational, not fatal.
    RateLimited,
}
