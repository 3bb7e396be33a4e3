//! Cryptography for room membership
//!
//! Pure functions over bytes; no I/O, no state. Everything a room needs
//! derives from its password:
//!
//! - `derive_key`: password → domain-separated `AuthKey` / `EncryptionKey`
//! - `challenge`: prove password knowledge without revealing it
//! - `seal`: authenticated encryption under the `EncryptionKey`
//! - `password`: a salted local verifier for the unlock prompt
//!
//! # Error opacity
//!
//! Every failure in this module is the same [`CryptoError`]. A caller (or
//! a peer probing the handshake) must not be able to learn *why* an
//! operation failed - a distinguishable error is an oracle.

mod challenge;
mod derive_key;
mod password;
mod seal;

pub use challenge::{new_challenge, sign, verify};
pub use derive_key::{
    derive_key, derive_room_keys, AuthKey, EncryptionKey, KeyPurpose, RoomKeys,
    DEFAULT_PBKDF2_ITERATIONS,
};
pub use password::{hash_password, verify_password};
pub use seal::{open, seal, NONCE_LEN};

use std::fmt;

/// The one error this module produces.
///
/// Deliberately carries no detail: tag mismatch, wrong length and bad
/// encoding all look identical from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoError;

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cryptographic operation failed")
    }
}

impl std::error::Error for CryptoError {}
