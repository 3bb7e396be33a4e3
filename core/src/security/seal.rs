//! Authenticated encryption for room payloads
//!
//! AES-256-GCM under the room's `EncryptionKey`. Each seal draws a fresh
//! random 12-byte nonce and emits `nonce || ciphertext || tag`. Nonce
//! reuse under one key breaks GCM completely, which is why there is no way
//! to supply a nonce from outside.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use super::{CryptoError, EncryptionKey};

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
pub fn seal(plaintext: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(nonce, plaintext).map_err(|_| CryptoError)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext || tag` blob.
///
/// Fails closed on anything: short input, bad tag, truncation.
pub fn open(sealed: &[u8], key: &EncryptionKey) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError);
    }
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError)?;

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher.decrypt(nonce, ciphertext).map_err(|_| CryptoError)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> EncryptionKey {
        EncryptionKey::from_bytes([seed; 32])
    }

    #[test]
    fn test_roundtrip() {
        let sealed = seal(b"attack at dawn", &key(1)).unwrap();
        assert_eq!(open(&sealed, &key(1)).unwrap(), b"attack at dawn");
    }

    #[test]
    fn test_roundtrip_empty() {
        let sealed = seal(b"", &key(1)).unwrap();
        assert_eq!(open(&sealed, &key(1)).unwrap(), b"");
    }

    #[test]
    fn test_layout_is_nonce_ct_tag() {
        let sealed = seal(b"hello", &key(1)).unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + 5 + TAG_LEN);
    }

    #[test]
    fn test_fresh_nonce_every_call() {
        let a = seal(b"same plaintext", &key(1)).unwrap();
        let b = seal(b"same plaintext", &key(1)).unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(b"secret", &key(1)).unwrap();
        assert_eq!(open(&sealed, &key(2)), Err(CryptoError));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = seal(b"secret", &key(1)).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(open(&sealed, &key(1)), Err(CryptoError));
    }

    #[test]
    fn test_tampered_nonce_fails() {
        let mut sealed = seal(b"secret", &key(1)).unwrap();
        sealed[0] ^= 0x01;
        assert_eq!(open(&sealed, &key(1)), Err(CryptoError));
    }

    #[test]
    fn test_truncated_input_fails() {
        let sealed = seal(b"secret", &key(1)).unwrap();
        assert_eq!(open(&sealed[..NONCE_LEN + 3], &key(1)), Err(CryptoError));
        assert_eq!(open(&[], &key(1)), Err(CryptoError));
    }
}
