//! Transport records and the channel seam
//!
//! A `Transport` tracks one remote peer from discovery to teardown:
//!
//! ```text
//! Negotiating ── channel opens ─► Open ── auth completes ─► (authenticated)
//!      │                            │
//!      └── failure / budget ──────► Closed (record evicted)
//! ```
//!
//! The actual byte channel hides behind [`PeerChannel`] /
//! [`PeerConnector`], so the session logic runs identically over the iroh
//! endpoint in production and over in-memory pairs in tests.

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;

use cove_proto::PeerId;

use super::auth::AuthExchange;
use super::error::SessionError;

/// An ordered reliable frame channel to one remote peer.
///
/// One line per frame; `recv` returning `None` means the channel closed.
#[async_trait]
pub trait PeerChannel: Send {
    async fn send(&mut self, line: &str) -> Result<(), SessionError>;
    async fn recv(&mut self) -> Option<String>;
    /// Close without sending anything further.
    async fn close(&mut self);
}

/// Establishes [`PeerChannel`]s from opaque connection metadata.
///
/// `local_metadata` is what we publish in offers, answers and presence
/// announcements; `dial` consumes a remote's metadata. `accept` yields
/// inbound channels together with the remote's endpoint identity so the
/// session can pair them with the negotiation that advertised it.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    fn local_metadata(&self) -> String;
    /// Endpoint identity contained in `metadata`, used for pairing.
    fn endpoint_of(&self, metadata: &str) -> Option<String>;
    async fn dial(&self, metadata: &str) -> Result<Box<dyn PeerChannel>, SessionError>;
    async fn accept(&self) -> Option<(String, Box<dyn PeerChannel>)>;
}

/// Lifecycle state of one transport record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Offer/answer exchange in progress; no channel yet.
    Negotiating,
    /// Channel open, authentication running or complete.
    Open,
}

/// Which side initiates the direct connection.
///
/// When both peers discover each other simultaneously the lower `PeerId`
/// dials and the higher one waits; otherwise both would open a channel
/// and one transport per pair would be wasted.
pub fn we_initiate(ours: &PeerId, theirs: &PeerId) -> bool {
    ours < theirs
}

/// Per-remote-peer state held by the session.
pub struct Transport {
    pub peer_id: PeerId,
    pub state: TransportState,
    pub auth: AuthExchange,
    /// Remote endpoint identity learned from its offer/answer, used to
    /// pair inbound channels.
    pub remote_endpoint: Option<String>,
    /// Outbound frame queue; present once the channel is open.
    pub outbound: Option<mpsc::UnboundedSender<String>>,
    /// Entire negotiation (discovery to authenticated) must finish by
    /// this deadline.
    pub deadline: Instant,
    /// Earlier deadline for the remote's answer to our challenge, armed
    /// when the channel opens.
    pub auth_deadline: Option<Instant>,
}

impl Transport {
    pub fn new(peer_id: PeerId, deadline: Instant) -> Self {
        Self {
            peer_id,
            state: TransportState::Negotiating,
            auth: AuthExchange::new(),
            remote_endpoint: None,
            outbound: None,
            deadline,
            auth_deadline: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == TransportState::Open && self.auth.is_authenticated()
    }

    /// Queue a frame for the channel task. Errors surface as channel
    /// closure through the reader side, so a failed send is just dropped.
    pub fn send_frame(&self, frame: &cove_proto::peer::PeerFrame) {
        if let Some(tx) = &self.outbound {
            let _ = tx.send(frame.encode());
        }
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer_id", &self.peer_id)
            .field("state", &self.state)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer(seed: u8) -> PeerId {
        PeerId::from_bytes([seed; 16])
    }

    #[test]
    fn test_initiation_tiebreak_is_asymmetric() {
        let low = peer(1);
        let high = peer(2);
        assert!(we_initiate(&low, &high));
        assert!(!we_initiate(&high, &low));
    }

    #[test]
    fn test_new_transport_is_negotiating() {
        let t = Transport::new(peer(1), Instant::now() + Duration::from_secs(30));
        assert_eq!(t.state, TransportState::Negotiating);
        assert!(!t.is_authenticated());
        assert!(t.outbound.is_none());
    }

    #[test]
    fn test_open_without_auth_is_not_authenticated() {
        let mut t = Transport::new(peer(1), Instant::now() + Duration::from_secs(30));
        t.state = TransportState::Open;
        assert!(!t.is_authenticated());
    }
}
