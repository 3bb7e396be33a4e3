//! Challenge-response authentication
//!
//! A peer proves it holds the room password by returning the HMAC-SHA256
//! of a 32-byte random challenge under the derived `AuthKey`. Verification
//! is constant-time; a failed verification reveals nothing about which
//! byte differed.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use cove_proto::peer::CHALLENGE_LEN;

use super::AuthKey;

type HmacSha256 = Hmac<Sha256>;

/// Generate a fresh 32-byte challenge.
pub fn new_challenge() -> [u8; CHALLENGE_LEN] {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut challenge);
    challenge
}

/// HMAC-SHA256 of the challenge under the auth key.
pub fn sign(challenge: &[u8], auth_key: &AuthKey) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(auth_key.as_bytes()).expect("HMAC accepts any key length");
    mac.update(challenge);
    mac.finalize().into_bytes().into()
}

/// Constant-time check that `response == sign(challenge, auth_key)`.
///
/// A wrong-length response is rejected immediately - length is public.
pub fn verify(challenge: &[u8], response: &[u8], auth_key: &AuthKey) -> bool {
    if response.len() != 32 {
        return false;
    }
    let expected = sign(challenge, auth_key);
    expected.ct_eq(response).into()
}
