//! Encrypted per-account credential persistence.
//!
//! Credential state is serialized to JSON, sealed with the configured
//! [`SecretSealer`], and stored as an opaque blob keyed by account id.
//! A blob that fails to open or parse is treated as absent so the
//! transport falls back to fresh pairing instead of crash-looping.

use uuid::Uuid;

use vendly_types::error::RepositoryError;
use vendly_types::session::{CredentialState, SealedEnvelope};

use crate::repository::session::SessionRepository;

/// Seals and opens credential blobs. Implemented by the vault layer.
pub trait SecretSealer: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope, SessionStoreError>;
    fn open(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>, SessionStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),
}

pub struct SessionStore<R, V> {
    repo: R,
    sealer: V,
}

impl<R: SessionRepository, V: SecretSealer> SessionStore<R, V> {
    pub fn new(repo: R, sealer: V) -> Self {
        Self { repo, sealer }
    }

    /// Load an account's credentials, returning fresh state when none
    /// are stored or the stored blob cannot be recovered.
    pub async fn load(&self, account_id: &Uuid) -> Result<CredentialState, SessionStoreError> {
        let Some(blob) = self.repo.load_blob(account_id).await? else {
            return Ok(CredentialState::fresh());
        };

        let envelope: SealedEnvelope = match serde_json::from_slice(&blob) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(
                    %account_id,
                    error = %err,
                    "Stored session blob is not a valid envelope, starting fresh"
                );
                return Ok(CredentialState::fresh());
            }
        };

        let plaintext = match self.sealer.open(&envelope) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                tracing::warn!(
                    %account_id,
                    error = %err,
                    "Session blob failed to decrypt, starting fresh"
                );
                return Ok(CredentialState::fresh());
            }
        };

        match serde_json::from_slice(&plaintext) {
            Ok(state) => Ok(state),
            Err(err) => {
                tracing::warn!(
                    %account_id,
                    error = %err,
                    "Decrypted session state failed to parse, starting fresh"
                );
                Ok(CredentialState::fresh())
            }
        }
    }

    /// Seal and persist an account's credentials.
    pub async fn save(
        &self,
        account_id: &Uuid,
        state: &CredentialState,
    ) -> Result<(), SessionStoreError> {
        let plaintext = serde_json::to_vec(state)
            .map_err(|err| SessionStoreError::Crypto(err.to_string()))?;
        let envelope = self.sealer.seal(&plaintext)?;
        let blob = serde_json::to_vec(&envelope)
            .map_err(|err| SessionStoreError::Crypto(err.to_string()))?;
        self.repo.save_blob(account_id, &blob).await?;
        Ok(())
    }

    /// Delete an account's stored credentials (logout).
    pub async fn clear(&self, account_id: &Uuid) -> Result<(), SessionStoreError> {
        self.repo.clear_blob(account_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MemoryRepo {
        blobs: Mutex<HashMap<Uuid, Vec<u8>>>,
    }

    impl MemoryRepo {
        fn new() -> Self {
            Self {
                blobs: Mutex::new(HashMap::new()),
            }
        }
    }

    impl SessionRepository for MemoryRepo {
        async fn load_blob(&self, account_id: &Uuid) -> Result<Option<Vec<u8>>, RepositoryError> {
            Ok(self.blobs.lock().unwrap().get(account_id).cloned())
        }

        async fn save_blob(&self, account_id: &Uuid, blob: &[u8]) -> Result<(), RepositoryError> {
            self.blobs
                .lock()
                .unwrap()
                .insert(*account_id, blob.to_vec());
            Ok(())
        }

        async fn clear_blob(&self, account_id: &Uuid) -> Result<(), RepositoryError> {
            self.blobs.lock().unwrap().remove(account_id);
            Ok(())
        }
    }

    /// XOR "cipher" sufficient to prove seal/open plumbing.
    struct XorSealer;

    impl SecretSealer for XorSealer {
        fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope, SessionStoreError> {
            Ok(SealedEnvelope {
                version: 1,
                nonce: vec![0x5a; 12],
                ciphertext: plaintext.iter().map(|b| b ^ 0x5a).collect(),
            })
        }

        fn open(&self, envelope: &SealedEnvelope) -> Result<Vec<u8>, SessionStoreError> {
            Ok(envelope.ciphertext.iter().map(|b| b ^ 0x5a).collect())
        }
    }

    /// Sealer that refuses to open anything, simulating a wrong key.
    struct BrokenSealer;

    impl SecretSealer for BrokenSealer {
        fn seal(&self, plaintext: &[u8]) -> Result<SealedEnvelope, SessionStoreError> {
            Ok(SealedEnvelope {
                version: 1,
                nonce: vec![0; 12],
                ciphertext: plaintext.to_vec(),
            })
        }

        fn open(&self, _envelope: &SealedEnvelope) -> Result<Vec<u8>, SessionStoreError> {
            Err(SessionStoreError::Crypto("aead tag mismatch".to_string()))
        }
    }

    fn registered_state() -> CredentialState {
        CredentialState {
            registered: true,
            key_material: vec![1, 2, 3, 4],
            session_keys: vec![9, 8, 7],
            server_token: Some("tok".to_string()),
            device_id: Some("dev-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = SessionStore::new(MemoryRepo::new(), XorSealer);
        let account = Uuid::now_v7();

        store.save(&account, &registered_state()).await.unwrap();
        let loaded = store.load(&account).await.unwrap();
        assert!(loaded.registered);
        assert_eq!(loaded.key_material, vec![1, 2, 3, 4]);
        assert_eq!(loaded.device_id.as_deref(), Some("dev-1"));
    }

    #[tokio::test]
    async fn test_missing_blob_yields_fresh() {
        let store = SessionStore::new(MemoryRepo::new(), XorSealer);
        let loaded = store.load(&Uuid::now_v7()).await.unwrap();
        assert!(loaded.is_fresh());
    }

    #[tokio::test]
    async fn test_decrypt_failure_yields_fresh() {
        let repo = MemoryRepo::new();
        let account = Uuid::now_v7();

        // Blob sealed with a key the store's sealer cannot open
        let plaintext = serde_json::to_vec(&registered_state()).unwrap();
        let envelope = XorSealer.seal(&plaintext).unwrap();
        let blob = serde_json::to_vec(&envelope).unwrap();
        repo.save_blob(&account, &blob).await.unwrap();

        let store = SessionStore::new(repo, BrokenSealer);
        let loaded = store.load(&account).await.unwrap();
        assert!(loaded.is_fresh());
    }

    #[tokio::test]
    async fn test_garbage_blob_yields_fresh() {
        let repo = MemoryRepo::new();
        let account = Uuid::now_v7();
        repo.save_blob(&account, b"not json at all").await.unwrap();

        let store = SessionStore::new(repo, XorSealer);
        let loaded = store.load(&account).await.unwrap();
        assert!(loaded.is_fresh());
    }

    #[tokio::test]
    async fn test_clear_removes_blob() {
        let store = SessionStore::new(MemoryRepo::new(), XorSealer);
        let account = Uuid::now_v7();
        store.save(&account, &registered_state()).await.unwrap();
        store.clear(&account).await.unwrap();
        assert!(store.load(&account).await.unwrap().is_fresh());
    }
}
