//! Cove Protocol Types
//!
//! Shared identifiers and wire formats for the Cove room protocol:
//!
//! - `ids`: `RoomId` and `PeerId` (128-bit random, canonical UUID rendering)
//! - `share_code`: one-time human-typeable invite codes (`ABCD-2345`)
//! - `api`: JSON bodies of the rendezvous HTTP surface
//! - `signal`: frames of the signaling relay channel
//! - `peer`: frames of the peer-to-peer datagram channel
//!
//! This crate is pure data: no I/O, no async. Both the rendezvous server
//! and the peer-side session manager depend on it so the two ends of every
//! wire agree by construction.

pub mod api;
pub mod ids;
pub mod peer;
pub mod share_code;
pub mod signal;

pub use ids::{IdParseError, PeerId, RoomId};
pub use share_code::{ShareCode, ShareCodeParseError, SHARE_CODE_ALPHABET};
