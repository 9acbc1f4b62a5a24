//! SQLite customer repository implementation.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use vendly_core::repository::customer::CustomerRepository;
use vendly_types::chat::Customer;
use vendly_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `CustomerRepository`.
#[derive(Clone)]
pub struct SqliteCustomerRepository {
    pool: DatabasePool,
}

impl SqliteCustomerRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn customer_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let id: String = row
        .try_get("id")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let created_at: String = row
        .try_get("created_at")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let blocked: i64 = row
        .try_get("blocked")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    let total_orders: i64 = row
        .try_get("total_orders")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

    Ok(Customer {
        id: parse_uuid(&id)?,
        address: row
            .try_get("address")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        name: row
            .try_get("name")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        language: row
            .try_get("language")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        blocked: blocked != 0,
        total_orders: total_orders as u32,
        total_spent_cents: row
            .try_get("total_spent_cents")
            .map_err(|e| RepositoryError::Query(e.to_string()))?,
        created_at: parse_datetime(&created_at)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

impl CustomerRepository for SqliteCustomerRepository {
    async fn get(&self, customer_id: &Uuid) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM customers WHERE id = ?")
            .bind(customer_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(customer_from_row).transpose()
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM customers WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(customer_from_row).transpose()
    }

    async fn create(&self, customer: &Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO customers
               (id, address, name, language, blocked, total_orders, total_spent_cents, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(customer.id.to_string())
        .bind(&customer.address)
        .bind(&customer.name)
        .bind(&customer.language)
        .bind(customer.blocked as i64)
        .bind(customer.total_orders as i64)
        .bind(customer.total_spent_cents)
        .bind(customer.created_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn record_completed_order(
        &self,
        customer_id: &Uuid,
        amount_cents: i64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE customers
               SET total_orders = total_orders + 1,
                   total_spent_cents = total_spent_cents + ?
               WHERE id = ?"#,
        )
        .bind(amount_cents)
        .bind(customer_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
