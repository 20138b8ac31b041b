//! Optional authenticated encryption of stored event state.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid cipher key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

/// Byte-level encryption; the outermost transform before storage.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM cipher.
///
/// Stored layout: a fresh random 12-byte nonce, followed by the ciphertext
/// (which carries the GCM authentication tag). Decryption authenticates, so
/// truncated or tampered input fails rather than yielding garbage.
pub struct AesGcmCipher {
    cipher: Aes256Gcm,
}

impl AesGcmCipher {
    pub const KEY_SIZE: usize = 32;
    pub const NONCE_SIZE: usize = 12;

    /// Build a cipher from a 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != Self::KEY_SIZE {
            return Err(CipherError::InvalidKey(format!(
                "expected {} bytes, got {}",
                Self::KEY_SIZE,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CipherError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }
}

impl core::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Never expose key material.
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(Self::NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() < Self::NONCE_SIZE {
            return Err(CipherError::Decrypt(format!(
                "input shorter than nonce ({} bytes)",
                ciphertext.len()
            )));
        }
        let (nonce_bytes, body) = ciphertext.split_at(Self::NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, body)
            .map_err(|e| CipherError::Decrypt(e.to_string()))
    }
}
