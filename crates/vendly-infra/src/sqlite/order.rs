//! SQLite order repository implementation.
//!
//! Status transitions write the order update and its audit action row in
//! one transaction on the writer pool; a failure in either rolls back
//! both.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use vendly_core::repository::order::OrderRepository;
use vendly_types::error::RepositoryError;
use vendly_types::order::{Order, OrderAction, OrderStatus};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `OrderRepository`.
#[derive(Clone)]
pub struct SqliteOrderRepository {
    pool: DatabasePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = get(row, "id")?;
    let customer_id: String = get(row, "customer_id")?;
    let package_id: String = get(row, "package_id")?;
    let account_id: String = get(row, "account_id")?;
    let status: String = get(row, "status")?;
    let created_at: String = get(row, "created_at")?;
    let updated_at: String = get(row, "updated_at")?;

    Ok(Order {
        id: parse_uuid(&id)?,
        reference: get(row, "reference")?,
        customer_id: parse_uuid(&customer_id)?,
        package_id: parse_uuid(&package_id)?,
        account_id: parse_uuid(&account_id)?,
        status: status.parse::<OrderStatus>().map_err(RepositoryError::Query)?,
        price_cents: get(row, "price_cents")?,
        currency: get(row, "currency")?,
        payment_proof_path: get(row, "payment_proof_path")?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
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

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

impl OrderRepository for SqliteOrderRepository {
    async fn get(&self, order_id: &Uuid) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(order_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_pending_for_customer(
        &self,
        customer_id: &Uuid,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT * FROM orders
               WHERE customer_id = ? AND status = 'PENDING'
               ORDER BY created_at DESC
               LIMIT 1"#,
        )
        .bind(customer_id.to_string())
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO orders
               (id, reference, customer_id, package_id, account_id, status,
                price_cents, currency, payment_proof_path, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(order.id.to_string())
        .bind(&order.reference)
        .bind(order.customer_id.to_string())
        .bind(order.package_id.to_string())
        .bind(order.account_id.to_string())
        .bind(order.status.to_string())
        .bind(order.price_cents)
        .bind(&order.currency)
        .bind(&order.payment_proof_path)
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn apply_transition(
        &self,
        order: &Order,
        action: &OrderAction,
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let result = sqlx::query(
            r#"UPDATE orders
               SET status = ?, payment_proof_path = ?, updated_at = ?
               WHERE id = ?"#,
        )
        .bind(order.status.to_string())
        .bind(&order.payment_proof_path)
        .bind(order.updated_at.to_rfc3339())
        .bind(order.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        sqlx::query(
            r#"INSERT INTO order_actions
               (id, order_id, from_status, to_status, actor_id, notes, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(action.id.to_string())
        .bind(action.order_id.to_string())
        .bind(action.from_status.to_string())
        .bind(action.to_status.to_string())
        .bind(action.actor_id.as_ref().map(|id| id.to_string()))
        .bind(&action.notes)
        .bind(action.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }
}
