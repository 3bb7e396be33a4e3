//! Stored password verifier
//!
//! Lets the application check a locally typed password without retaining
//! it: `base64(salt) ":" base64(PBKDF2(pw, salt, 100000, 32))` with a
//! random 16-byte salt. Strictly local - the verifier is never sent over
//! any wire and is never used as a key. Key material comes from
//! [`super::derive_room_keys`] instead.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::DEFAULT_PBKDF2_ITERATIONS;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

fn pbkdf2_digest(password: &[u8], salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

/// Hash a password for local storage.
pub fn hash_password(password: &[u8]) -> String {
    hash_password_with_iterations(password, DEFAULT_PBKDF2_ITERATIONS)
}

fn hash_password_with_iterations(password: &[u8], iterations: u32) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let digest = pbkdf2_digest(password, &salt, iterations);
    format!("{}:{}", BASE64.encode(salt), BASE64.encode(digest))
}

/// Check a typed password against a stored verifier.
///
/// Constant-time comparison; any malformed verifier is simply `false` -
/// the caller learns nothing about what was wrong with it.
pub fn verify_password(password: &[u8], stored: &str) -> bool {
    verify_password_with_iterations(password, stored, DEFAULT_PBKDF2_ITERATIONS)
}

fn verify_password_with_iterations(password: &[u8], stored: &str, iterations: u32) -> bool {
    let Some((salt_b64, hash_b64)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = BASE64.decode(salt_b64) else {
        return false;
    };
    let Ok(expected) = BASE64.decode(hash_b64) else {
        return false;
    };
    if expected.len() != HASH_LEN {
        return false;
    }
    let digest = pbkdf2_digest(password, &salt, iterations);
    digest.ct_eq(&expected[..]).into()
}
