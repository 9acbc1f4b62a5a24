//! Account session-blob repository trait definition.

use uuid::Uuid;
use vendly_types::error::RepositoryError;

/// Repository trait for encrypted transport-session blobs.
///
/// Blobs are opaque here: sealing/opening happens in the session store.
pub trait SessionRepository: Send + Sync {
    /// The stored blob for an account, if any.
    fn load_blob(
        &self,
        account_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Vec<u8>>, RepositoryError>> + Send;

    /// Insert or replace the stored blob for an account.
    fn save_blob(
        &self,
        account_id: &Uuid,
        blob: &[u8],
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Remove the stored blob (logout).
    fn clear_blob(
        &self,
        account_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
