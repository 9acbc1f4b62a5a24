//! SQLite provider repository implementation.
//!
//! Provider API keys are sealed by the vault before they touch the
//! database and unsealed straight into `SecretString` on load. Usage
//! recording increments the daily counter and inserts the audit row in
//! one transaction.

use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;
use uuid::Uuid;

use vendly_core::repository::provider::ProviderRepository;
use vendly_types::error::RepositoryError;
use vendly_types::llm::{ProviderConfig, ProviderKind, UsageRecord};
use vendly_types::session::SealedEnvelope;

use crate::crypto::VaultCrypto;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ProviderRepository`.
#[derive(Clone)]
pub struct SqliteProviderRepository {
    pool: DatabasePool,
    vault: Arc<VaultCrypto>,
}

impl SqliteProviderRepository {
    pub fn new(pool: DatabasePool, vault: Arc<VaultCrypto>) -> Self {
        Self { pool, vault }
    }

    /// Insert or replace a provider configuration, sealing the API key.
    pub async fn upsert_config(&self, config: &ProviderConfig) -> Result<(), RepositoryError> {
        let envelope = self
            .vault
            .encrypt(config.api_key.expose_secret().as_bytes())
            .map_err(|e| RepositoryError::Query(format!("seal api key: {e}")))?;
        let sealed = serde_json::to_string(&envelope)
            .map_err(|e| RepositoryError::Query(format!("serialize envelope: {e}")))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"INSERT INTO providers
               (id, name, kind, api_key_sealed, base_url, model, priority,
                daily_limit, used_today, exhausted, enabled, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 kind = excluded.kind,
                 api_key_sealed = excluded.api_key_sealed,
                 base_url = excluded.base_url,
                 model = excluded.model,
                 priority = excluded.priority,
                 daily_limit = excluded.daily_limit,
                 enabled = excluded.enabled,
                 updated_at = excluded.updated_at"#,
        )
        .bind(config.id.to_string())
        .bind(&config.name)
        .bind(config.kind.to_string())
        .bind(&sealed)
        .bind(&config.base_url)
        .bind(&config.model)
        .bind(config.priority as i64)
        .bind(config.daily_limit as i64)
        .bind(config.used_today as i64)
        .bind(config.exhausted as i64)
        .bind(config.enabled as i64)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    fn config_from_row(
        &self,
        row: &sqlx::sqlite::SqliteRow,
    ) -> Result<ProviderConfig, RepositoryError> {
        let id: String = get(row, "id")?;
        let kind: String = get(row, "kind")?;
        let sealed: String = get(row, "api_key_sealed")?;
        let priority: i64 = get(row, "priority")?;
        let daily_limit: i64 = get(row, "daily_limit")?;
        let used_today: i64 = get(row, "used_today")?;
        let exhausted: i64 = get(row, "exhausted")?;
        let enabled: i64 = get(row, "enabled")?;

        let envelope: SealedEnvelope = serde_json::from_str(&sealed)
            .map_err(|e| RepositoryError::Query(format!("parse envelope: {e}")))?;
        let key_bytes = self
            .vault
            .decrypt(&envelope)
            .map_err(|e| RepositoryError::Query(format!("unseal api key: {e}")))?;
        let api_key = String::from_utf8(key_bytes)
            .map_err(|_| RepositoryError::Query("api key is not valid UTF-8".into()))?;

        Ok(ProviderConfig {
            id: parse_uuid(&id)?,
            name: get(row, "name")?,
            kind: kind.parse::<ProviderKind>().map_err(RepositoryError::Query)?,
            api_key: SecretString::from(api_key),
            base_url: get(row, "base_url")?,
            model: get(row, "model")?,
            priority: priority as u32,
            daily_limit: daily_limit as u32,
            used_today: used_today as u32,
            exhausted: exhausted != 0,
            enabled: enabled != 0,
        })
    }
}

fn get<'r, T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>>(
    row: &'r sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<T, RepositoryError> {
    row.try_get(column)
        .map_err(|e| RepositoryError::Query(e.to_string()))
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

impl ProviderRepository for SqliteProviderRepository {
    async fn list_configs(&self) -> Result<Vec<ProviderConfig>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM providers ORDER BY priority DESC, name")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(|row| self.config_from_row(row)).collect()
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE providers SET used_today = used_today + 1, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(record.provider_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r#"INSERT INTO provider_usage_log
               (id, provider_id, model, input_tokens, output_tokens, latency_ms, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.provider_id.to_string())
        .bind(&record.model)
        .bind(record.input_tokens as i64)
        .bind(record.output_tokens as i64)
        .bind(record.latency_ms as i64)
        .bind(record.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn mark_exhausted(&self, provider_id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE providers SET exhausted = 1, updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(provider_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn reset_daily_usage(&self) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE providers SET used_today = 0, exhausted = 0, updated_at = ?")
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_repo() -> (tempfile::TempDir, SqliteProviderRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        let vault = Arc::new(VaultCrypto::new(&[7u8; 32]));
        (dir, SqliteProviderRepository::new(pool, vault))
    }

    fn make_config(name: &str, priority: u32) -> ProviderConfig {
        ProviderConfig {
            id: Uuid::now_v7(),
            name: name.to_string(),
            kind: ProviderKind::OpenAiCompatible,
            api_key: SecretString::from("sk-super-secret"),
            base_url: Some("https://api.example.com/v1".to_string()),
            model: "gpt-4o-mini".to_string(),
            priority,
            daily_limit: 500,
            used_today: 0,
            exhausted: false,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_list_roundtrips_sealed_key() {
        let (_dir, repo) = test_repo().await;
        repo.upsert_config(&make_config("alpha", 5)).await.unwrap();
        repo.upsert_config(&make_config("beta", 10)).await.unwrap();

        let configs = repo.list_configs().await.unwrap();
        assert_eq!(configs.len(), 2);
        // Priority descending
        assert_eq!(configs[0].name, "beta");
        assert_eq!(configs[1].name, "alpha");
        assert_eq!(configs[0].api_key.expose_secret(), "sk-super-secret");

        // The key never hits the database in the clear
        let (sealed,): (String,) = sqlx::query_as("SELECT api_key_sealed FROM providers LIMIT 1")
            .fetch_one(&repo.pool.reader)
            .await
            .unwrap();
        assert!(!sealed.contains("sk-super-secret"));
    }

    #[tokio::test]
    async fn test_record_usage_increments_and_logs() {
        let (_dir, repo) = test_repo().await;
        let config = make_config("alpha", 5);
        repo.upsert_config(&config).await.unwrap();

        let record = UsageRecord {
            id: Uuid::now_v7(),
            provider_id: config.id,
            model: "gpt-4o-mini".to_string(),
            input_tokens: 100,
            output_tokens: 50,
            latency_ms: 800,
            created_at: Utc::now(),
        };
        repo.record_usage(&record).await.unwrap();

        let configs = repo.list_configs().await.unwrap();
        assert_eq!(configs[0].used_today, 1);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM provider_usage_log")
            .fetch_one(&repo.pool.reader)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_record_usage_unknown_provider_rolls_back() {
        let (_dir, repo) = test_repo().await;

        let record = UsageRecord {
            id: Uuid::now_v7(),
            provider_id: Uuid::now_v7(),
            model: "gpt-4o-mini".to_string(),
            input_tokens: 1,
            output_tokens: 1,
            latency_ms: 1,
            created_at: Utc::now(),
        };
        let err = repo.record_usage(&record).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM provider_usage_log")
            .fetch_one(&repo.pool.reader)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_mark_exhausted_and_daily_reset() {
        let (_dir, repo) = test_repo().await;
        let config = make_config("alpha", 5);
        repo.upsert_config(&config).await.unwrap();

        repo.mark_exhausted(&config.id).await.unwrap();
        let configs = repo.list_configs().await.unwrap();
        assert!(configs[0].exhausted);

        repo.reset_daily_usage().await.unwrap();
        let configs = repo.list_configs().await.unwrap();
        assert!(!configs[0].exhausted);
        assert_eq!(configs[0].used_today, 0);
    }
}
