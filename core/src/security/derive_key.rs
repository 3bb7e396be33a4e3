//! Key derivation from room passwords
//!
//! PBKDF2-HMAC-SHA256 with 100 000 iterations to a 256-bit output. The
//! purpose string is appended to the salt as `"<salt>:<purpose>"`, so one
//! password yields two cryptographically independent keys per room:
//!
//! ```
//! use cove_core::security::{derive_room_keys, DEFAULT_PBKDF2_ITERATIONS};
//! use cove_proto::RoomId;
//!
//! let room = RoomId::from_bytes([0u8; 16]);
//! let keys = derive_room_keys(b"correct horse", &room, DEFAULT_PBKDF2_ITERATIONS);
//! assert_ne!(keys.auth.as_bytes(), keys.encryption.as_bytes());
//! ```
//!
//! The salt for a room is its canonical lowercase id string, so every peer
//! holding the password derives identical keys with no coordination.
//!
//! Derivation takes ~100 ms by design; callers on a latency-sensitive task
//! should offload it (`tokio::task::spawn_blocking`).

use std::fmt;

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use cove_proto::RoomId;

/// Iteration count of the original deployment. Lowering it weakens every
/// room; raising it breaks interop with peers on the default.
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Domain separation label for a derived key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// HMAC key for the challenge-response handshake.
    Auth,
    /// AES-256-GCM key for payload encryption.
    Encrypt,
}

impl KeyPurpose {
    fn label(self) -> &'static str {
        match self {
            KeyPurpose::Auth => "auth",
            KeyPurpose::Encrypt => "encrypt",
        }
    }
}

macro_rules! key_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
        pub struct $name([u8; 32]);

        impl $name {
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            #[cfg(test)]
            pub(crate) fn from_bytes(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "([REDACTED])"))
            }
        }
    };
}

key_type!(AuthKey, "HMAC-SHA256 key proving room membership. Held in memory only.");
key_type!(EncryptionKey, "AES-256-GCM key for room payloads. Held in memory only.");

/// Both keys a peer derives for a room.
#[derive(Debug, Clone)]
pub struct RoomKeys {
    pub auth: AuthKey,
    pub encryption: EncryptionKey,
}

/// Derive one 256-bit key.
///
/// `salt` and `purpose` are combined as the literal bytes
/// `"<salt>:<purpose>"`. Deterministic: same inputs, same key.
pub fn derive_key(password: &[u8], salt: &str, purpose: KeyPurpose, iterations: u32) -> [u8; 32] {
    let salted = format!("{}:{}", salt, purpose.label());
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salted.as_bytes(), iterations, &mut out);
    out
}

/// Derive the auth and encryption keys for a room.
///
/// Salt is the room id in its canonical string form.
pub fn derive_room_keys(password: &[u8], room_id: &RoomId, iterations: u32) -> RoomKeys {
    let salt = room_id.to_string();
    RoomKeys {
        auth: AuthKey(derive_key(password, &salt, KeyPurpose::Auth, iterations)),
        encryption: EncryptionKey(derive_key(password, &salt, KeyPurpose::Encrypt, iterations)),
    }
}
