//! Room and peer identifiers
//!
//! Both are 128 random bits rendered in the canonical lowercase
//! 8-4-4-4-12 hex form (`550e8400-e29b-41d4-a716-446655440000`). Parsing
//! is strict: exactly 36 characters, hyphens in the canonical positions,
//! lowercase hex only. The rendezvous server rejects anything else with
//! `InvalidArgument`.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Error parsing a canonical identifier string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParseError;

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a canonical lowercase 8-4-4-4-12 identifier")
    }
}

impl std::error::Error for IdParseError {}

/// Hyphen positions in the canonical rendering.
const HYPHENS: [usize; 4] = [8, 13, 18, 23];

fn format_canonical(bytes: &[u8; 16], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let hex = hex::encode(bytes);
    write!(
        f,
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn parse_canonical(s: &str) -> Result<[u8; 16], IdParseError> {
    if s.len() != 36 {
        return Err(IdParseError);
    }
    let mut hex_chars = String::with_capacity(32);
    for (i, c) in s.chars().enumerate() {
        if HYPHENS.contains(&i) {
            if c != '-' {
                return Err(IdParseError);
            }
        } else if c.is_ascii_hexdigit() && !c.is_ascii_uppercase() {
            hex_chars.push(c);
        } else {
            return Err(IdParseError);
        }
    }
    let bytes = hex::decode(&hex_chars).map_err(|_| IdParseError)?;
    let mut out = [0u8; 16];
    out.copy_from_slice(&bytes);
    Ok(out)
}

macro_rules! uuid_like_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; 16]);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn random() -> Self {
                let mut bytes = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// The raw 16 bytes.
            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Construct from raw bytes (used by tests and key derivation).
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            /// Short hex prefix for log lines.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_canonical(&self.0, f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_canonical(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

uuid_like_id!(
    RoomId,
    "Identifier of a replication room. Knowing it grants nothing without the room password."
);
uuid_like_id!(
    PeerId,
    "Per-session peer identifier. Freshly chosen each session; meaningless until its holder passes the challenge-response."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_canonical() {
        let id = RoomId::from_bytes([
            0x55, 0x0e, 0x84, 0x00, 0xe2, 0x9b, 0x41, 0xd4, 0xa7, 0x16, 0x44, 0x66, 0x55, 0x44,
            0x00, 0x00,
        ]);
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_roundtrip() {
        let id = RoomId::random();
        let parsed: RoomId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_rejects_uppercase() {
        assert!("550E8400-e29b-41d4-a716-446655440000"
            .parse::<RoomId>()
            .is_err());
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!("550e8400-e29b-41d4-a716".parse::<RoomId>().is_err());
        assert!("".parse::<RoomId>().is_err());
        assert!("550e8400-e29b-41d4-a716-446655440000ff"
            .parse::<RoomId>()
            .is_err());
    }

    #[test]
    fn test_rejects_misplaced_hyphens() {
        assert!("550e8400e-29b-41d4-a716-446655440000"
            .parse::<RoomId>()
            .is_err());
        assert!("550e8400 e29b-41d4-a716-446655440000"
            .parse::<RoomId>()
            .is_err());
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(PeerId::random(), PeerId::random());
    }

    #[test]
    fn test_serde_as_string() {
        let id: RoomId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<RoomId, _> = serde_json::from_str("\"not-a-room\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_ordering_is_total() {
        // Transport-initiation tiebreak relies on a stable total order.
        let a = PeerId::from_bytes([1u8; 16]);
        let b = PeerId::from_bytes([2u8; 16]);
        assert!(a < b);
        assert!(!(b < a));
    }
}
