//! AEAD layer over mesh DATA payloads.
//!
//! A stateless adapter over AES-256-GCM (12-byte nonce, 16-byte tag).

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

pub const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("AEAD authentication failed")]
    AuthFail,
}

/// Encrypts/decrypts with a fixed, shared symmetric key loaded once at startup.
pub struct MeshEncryptor {
    cipher: Option<Aes256Gcm>,
}

impl MeshEncryptor {
    /// `key` is `None` when `security.enable_encryption` is false or no key was
    /// configured; `encryption_enabled()` reflects that directly.
    pub fn new(key: Option<[u8; 32]>) -> Self {
        let cipher = key.map(|k| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&k)));
        MeshEncryptor { cipher }
    }

    pub fn encryption_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt `plaintext` with a freshly-generated random nonce, authenticating
    /// `aad`. Panics if encryption is not enabled; callers must check
    /// `encryption_enabled()` first.
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> (Vec<u8>, Vec<u8>) {
        let cipher = self.cipher.as_ref().expect("encryption not enabled");
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .expect("AES-GCM encryption over bounded input cannot fail");

        (nonce_bytes.to_vec(), ciphertext)
    }

    /// Decrypt `ciphertext` (tag included) using `nonce`, verifying `aad`.
    pub fn decrypt(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = self.cipher.as_ref().ok_or(CryptoError::AuthFail)?;
        let nonce = Nonce::from_slice(nonce);
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::AuthFail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_matching_aad() {
        let key = [7u8; 32];
        let enc = MeshEncryptor::new(Some(key));
        assert!(enc.encryption_enabled());

        let (nonce, ciphertext) = enc.encrypt(b"hello mesh", b"aad-bytes");
        let plaintext = enc.decrypt(&nonce, &ciphertext, b"aad-bytes").unwrap();
        assert_eq!(plaintext, b"hello mesh");
    }

    #[test]
    fn decrypt_fails_with_different_aad() {
        let key = [9u8; 32];
        let enc = MeshEncryptor::new(Some(key));
        let (nonce, ciphertext) = enc.encrypt(b"payload", b"aad-one");
        let result = enc.decrypt(&nonce, &ciphertext, b"aad-two");
        assert!(matches!(result, Err(CryptoError::AuthFail)));
    }

    #[test]
    fn decrypt_fails_on_bit_flip() {
        let key = [3u8; 32];
        let enc = MeshEncryptor::new(Some(key));
        let (nonce, mut ciphertext) = enc.encrypt(b"payload", b"aad");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x01;
        assert!(enc.decrypt(&nonce, &ciphertext, b"aad").is_err());
    }

    #[test]
    fn disabled_encryptor_reports_not_enabled() {
        let enc = MeshEncryptor::new(None);
        assert!(!enc.encryption_enabled());
    }
}
