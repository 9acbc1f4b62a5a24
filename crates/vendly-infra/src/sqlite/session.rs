//! SQLite account-session blob storage.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use vendly_core::repository::session::SessionRepository;
use vendly_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionRepository`.
///
/// Stores one opaque blob per transport account. The blob is already
/// sealed by the time it arrives here.
#[derive(Clone)]
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl SessionRepository for SqliteSessionRepository {
    async fn load_blob(&self, account_id: &Uuid) -> Result<Option<Vec<u8>>, RepositoryError> {
        let row = sqlx::query("SELECT blob FROM account_sessions WHERE account_id = ?")
            .bind(account_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let blob: Vec<u8> = row
                    .try_get("blob")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(blob))
            }
            None => Ok(None),
        }
    }

    async fn save_blob(&self, account_id: &Uuid, blob: &[u8]) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO account_sessions (account_id, blob, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(account_id) DO UPDATE SET
                 blob = excluded.blob,
                 updated_at = excluded.updated_at"#,
        )
        .bind(account_id.to_string())
        .bind(blob)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn clear_blob(&self, account_id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM account_sessions WHERE account_id = ?")
            .bind(account_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_repo() -> (tempfile::TempDir, SqliteSessionRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteSessionRepository::new(pool))
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let (_dir, repo) = test_repo().await;
        let account_id = Uuid::now_v7();

        assert!(repo.load_blob(&account_id).await.unwrap().is_none());

        repo.save_blob(&account_id, b"first").await.unwrap();
        assert_eq!(repo.load_blob(&account_id).await.unwrap().unwrap(), b"first");

        // Overwrite, not duplicate
        repo.save_blob(&account_id, b"second").await.unwrap();
        assert_eq!(
            repo.load_blob(&account_id).await.unwrap().unwrap(),
            b"second"
        );

        repo.clear_blob(&account_id).await.unwrap();
        assert!(repo.load_blob(&account_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blobs_are_per_account() {
        let (_dir, repo) = test_repo().await;
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        repo.save_blob(&a, b"aaa").await.unwrap();
        repo.save_blob(&b, b"bbb").await.unwrap();
        repo.clear_blob(&a).await.unwrap();

        assert!(repo.load_blob(&a).await.unwrap().is_none());
        assert_eq!(repo.load_blob(&b).await.unwrap().unwrap(), b"bbb");
    }
}
