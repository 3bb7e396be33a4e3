//! One-time share codes
//!
//! Eight symbols over a 32-character alphabet that omits `I`, `O`, `0` and
//! `1`, rendered with a hyphen between positions 4 and 5 (`ABCD-2345`).
//! Roughly 40 bits of entropy; bound to one `RoomId` at the rendezvous and
//! redeemable at most once within its 300 s lifetime.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The code alphabet. No `I`, `O`, `0`, `1` - they are too easy to misread
/// over a phone call or a hand-written note.
pub const SHARE_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of symbols in a code (excluding the hyphen).
pub const SHARE_CODE_LEN: usize = 8;

/// Error parsing a share code string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShareCodeParseError;

impl fmt::Display for ShareCodeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "share codes look like ABCD-2345")
    }
}

impl std::error::Error for ShareCodeParseError {}

/// A share code in canonical (uppercase, hyphenated) form.
///
/// Parsing is case-insensitive and accepts any `[A-Z0-9]` symbols so that a
/// mistyped code turns into a clean `NotFound` at redemption rather than a
/// parse error; only generation is restricted to [`SHARE_CODE_ALPHABET`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShareCode(String);

impl ShareCode {
    /// Generate a fresh random code from the restricted alphabet.
    pub fn generate() -> Self {
        let mut raw = [0u8; SHARE_CODE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut raw);
        Self::from_entropy(&raw)
    }

    /// Map 8 entropy bytes into a code (each byte modulo 32).
    pub fn from_entropy(raw: &[u8; SHARE_CODE_LEN]) -> Self {
        let mut s = String::with_capacity(SHARE_CODE_LEN + 1);
        for (i, byte) in raw.iter().enumerate() {
            if i == 4 {
                s.push('-');
            }
            s.push(SHARE_CODE_ALPHABET[(*byte as usize) % 32] as char);
        }
        ShareCode(s)
    }

    /// The canonical rendering, e.g. `ABCD-2345`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ShareCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShareCode({})", self.0)
    }
}

impl FromStr for ShareCode {
    type Err = ShareCodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: Vec<char> = s.chars().filter(|&c| c != '-').collect();
        if compact.len() != SHARE_CODE_LEN {
            return Err(ShareCodeParseError);
        }
        let mut canonical = String::with_capacity(SHARE_CODE_LEN + 1);
        for (i, c) in compact.iter().enumerate() {
            if !c.is_ascii_alphanumeric() {
                return Err(ShareCodeParseError);
            }
            if i == 4 {
                canonical.push('-');
            }
            canonical.push(c.to_ascii_uppercase());
        }
        Ok(ShareCode(canonical))
    }
}

impl Serialize for ShareCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ShareCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_format() {
        let code = ShareCode::generate();
        let s = code.as_str();
        assert_eq!(s.len(), 9);
        assert_eq!(s.as_bytes()[4], b'-');
    }

    #[test]
    fn test_alphabet_excludes_ambiguous_symbols() {
        // 10 000 samples, none may contain I, O, 0 or 1.
        for _ in 0..10_000 {
            let code = ShareCode::generate();
            for c in code.as_str().chars() {
                assert!(!matches!(c, 'I' | 'O' | '0' | '1'), "ambiguous {} in {}", c, code);
            }
        }
    }

    #[test]
    fn test_from_entropy_is_deterministic() {
        let a = ShareCode::from_entropy(&[0, 1, 2, 3, 4, 5, 6, 7]);
        let b = ShareCode::from_entropy(&[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "ABCD-EFGH");
    }

    #[test]
    fn test_entropy_wraps_modulo_alphabet() {
        let code = ShareCode::from_entropy(&[32, 33, 255, 64, 0, 0, 0, 0]);
        // 32 % 32 = 0 -> 'A', 33 % 32 = 1 -> 'B', 255 % 32 = 31 -> '9'
        assert!(code.as_str().starts_with("AB9"));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let code: ShareCode = "abcd-wxyz".parse().unwrap();
        assert_eq!(code.as_str(), "ABCD-WXYZ");
    }

    #[test]
    fn test_parse_accepts_missing_hyphen() {
        let code: ShareCode = "ABCDWXYZ".parse().unwrap();
        assert_eq!(code.as_str(), "ABCD-WXYZ");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<ShareCode>().is_err());
        assert!("ABC-123".parse::<ShareCode>().is_err());
        assert!("ABCD-12345".parse::<ShareCode>().is_err());
        assert!("ABCD_WXYZ".parse::<ShareCode>().is_err());
        assert!("ABCD-WX Z".parse::<ShareCode>().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let code: ShareCode = "ABCD-2345".parse().unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"ABCD-2345\"");
        let back: ShareCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }
}
