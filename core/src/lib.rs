//! Cove Core
//!
//! Peer side of the Cove protocol: replicate a shared document between
//! mutually trusting devices over the public Internet, with an untrusted
//! rendezvous server used only to find one another.
//!
//! The security model is a single room password. From `(password, room id)`
//! every peer derives the same authentication and encryption keys; a
//! challenge-response handshake over each direct transport proves password
//! knowledge in both directions before a single document byte moves. The
//! rendezvous never sees passwords, keys or content.
//!
//! # Module Structure
//!
//! - `security/`: pure crypto (key derivation, challenge-response, AEAD,
//!   password verifier)
//! - `rendezvous/`: HTTP client and signaling channel to the bulletin board
//! - `session/`: the per-room session manager and its state machines
//! - `sync/`: the Loro-backed room document
//! - `net/`: peer channel implementations (iroh and in-memory)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use cove_core::net::IrohConnector;
//! use cove_core::session::{Session, SessionConfig};
//! use cove_core::rendezvous::RendezvousClient;
//! use cove_proto::RoomId;
//!
//! // Host: create a room and an invite.
//! let config = SessionConfig::new("http://rendezvous.example:8787");
//! let room_id = RoomId::random();
//! let connector = Arc::new(IrohConnector::bind().await?);
//! let session = Session::start(config.clone(), room_id, b"room password", connector).await?;
//! let client = RendezvousClient::new(&config.rendezvous_base_url, config.request_deadline())?;
//! let invite = client.create_invite(&room_id).await?;
//! println!("share code: {}", invite.code);
//!
//! // Joiner: redeem the code (told out of band, like the password).
//! let room_id = client.redeem_invite(&invite.code).await?;
//! // ...then Session::start with the same password.
//! ```

pub mod net;
pub mod rendezvous;
pub mod security;
pub mod session;
pub mod sync;

// Re-export the main API types for convenience
pub use cove_proto::{PeerId, RoomId, ShareCode};
pub use rendezvous::RendezvousClient;
pub use session::{
    Session, SessionConfig, SessionError, SessionEvent, SessionStatus,
};
pub use sync::RoomDoc;
