//! AES-256-GCM vault encryption for secrets at rest.
//!
//! VaultCrypto seals session credentials and provider API keys using
//! AES-256-GCM with a fresh random nonce per call. The master key comes
//! from either a raw 32-byte key or a passphrase (Argon2id derivation).
//!
//! SECURITY: Error types never contain plaintext or key material.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use thiserror::Error;

use vendly_types::session::SealedEnvelope;

use vendly_core::session::{SecretSealer, SessionStoreError};

/// Nonce size for AES-256-GCM (96 bits / 12 bytes).
const NONCE_SIZE: usize = 12;

/// Envelope format version written into every seal.
const ENVELOPE_VERSION: u8 = 1;

/// Errors from vault encryption operations.
///
/// IMPORTANT: These errors never include plaintext, key material, or
/// ciphertext in their Display/Debug output to prevent accidental logging
/// of secrets.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid envelope: bad nonce length")]
    InvalidNonce,

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    #[error("key derivation failed")]
    KeyDerivationFailed,
}

/// AES-256-GCM encryption for vault secrets at rest.
///
/// Each seal generates a random 12-byte nonce, carried alongside the
/// ciphertext in the envelope. Sealing the same plaintext twice always
/// produces different output.
pub struct VaultCrypto {
    cipher: Aes256Gcm,
}

impl VaultCrypto {
    /// Create a new VaultCrypto from a raw 32-byte key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Derive a 32-byte encryption key from a passphrase using Argon2id.
    ///
    /// Uses OWASP recommended parameters:
    /// - 19 MiB memory (19456 KiB)
    /// - 2 iterations
    /// - 1 parallelism degree
    ///
    /// The salt is deterministic ("vendly-vault-v1") so the same
    /// passphrase always produces the same key. This is acceptable because
    /// the passphrase itself provides the entropy, and the hash is used as
    /// a KDF for encryption, not stored for verification.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, VaultError> {
        use argon2::{Algorithm, Argon2, Params, Version};

        let params = Params::new(19456, 2, 1, Some(32))
            .map_err(|_| VaultError::KeyDerivationFailed)?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let salt = b"vendly-vault-v1";
        let mut key = [0u8; 32];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|_| VaultError::KeyDerivationFailed)?;

        Ok(Self::new(&key))
    }

    /// Encrypt plaintext into a versioned envelope with a fresh nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SealedEnvelope, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| VaultError::EncryptionFailed)?;

        Ok(SealedEnvelope {
            version: ENVELOPE_VERSION,
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Decrypt an envelope produced by `encrypt()`.
    pub fn decrypt(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>, VaultError> {
        if envelope.version != ENVELOPE_VERSION {
            return Err(VaultError::UnsupportedVersion(envelope.version));
        }
        if envelope.nonce.len() != NONCE_SIZE {
            return Err(VaultError::InvalidNonce);
        }

        let nonce = Nonce::from_slice(&envelope.nonce);
        self.cipher
            .decrypt(nonce, envelope.ciphertext.as_slice())
            .map_err(|_| VaultError::DecryptionFailed)
    }
}

impl SecretSealer for VaultCrypto {
    fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope, SessionStoreError> {
        self.encrypt(plaintext)
            .map_err(|err| SessionStoreError::Crypto(err.to_string()))
    }

    fn open(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>, SessionStoreError> {
        self.decrypt(envelope)
            .map_err(|err| SessionStoreError::Crypto(err.to_string()))
    }
}
