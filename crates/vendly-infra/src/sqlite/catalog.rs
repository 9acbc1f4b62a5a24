//! SQLite catalog repository: packages, templates, business profile.

use sqlx::Row;
use uuid::Uuid;

use vendly_core::repository::catalog::CatalogRepository;
use vendly_types::chat::ServicePackage;
use vendly_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CatalogRepository`.
#[derive(Clone)]
pub struct SqliteCatalogRepository {
    pool: DatabasePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a package. Used by seeding and admin tooling.
    pub async fn upsert_package(&self, package: &ServicePackage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO packages (id, name, description, price_cents, currency, active)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 price_cents = excluded.price_cents,
                 currency = excluded.currency,
                 active = excluded.active"#,
        )
        .bind(package.id.to_string())
        .bind(&package.name)
        .bind(&package.description)
        .bind(package.price_cents)
        .bind(&package.currency)
        .bind(package.active as i64)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    /// Insert or replace a notification template body.
    pub async fn set_template(&self, key: &str, body: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO templates (key, body) VALUES (?, ?)
               ON CONFLICT(key) DO UPDATE SET body = excluded.body"#,
        )
        .bind(key)
        .bind(body)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    /// Set the business profile text used in the system prompt.
    pub async fn set_business_profile(&self, profile: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO settings (key, value) VALUES ('business_profile', ?)
               ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
        )
        .bind(profile)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}

fn package_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ServicePackage, RepositoryError> {
    let id: String = get(row, "id")?;
    let active: i64 = get(row, "active")?;

    Ok(ServicePackage {
        id: parse_uuid(&id)?,
        name: get(row, "name")?,
        description: get(row, "description")?,
        price_cents: get(row, "price_cents")?,
        currency: get(row, "currency")?,
        active: active != 0,
    })
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

impl CatalogRepository for SqliteCatalogRepository {
    async fn list_active_packages(&self) -> Result<Vec<ServicePackage>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM packages WHERE active = 1 ORDER BY name")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter().map(package_from_row).collect()
    }

    async fn get_package(
        &self,
        package_id: &Uuid,
    ) -> Result<Option<ServicePackage>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM packages WHERE id = ?")
            .bind(package_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(package_from_row).transpose()
    }

    async fn get_template(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT body FROM templates WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| get::<String>(&r, "body")).transpose()
    }

    async fn business_profile(&self) -> Result<String, RepositoryError> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = 'business_profile'")
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => get(&row, "value"),
            None => Ok(String::new()),
        }
    }
}
