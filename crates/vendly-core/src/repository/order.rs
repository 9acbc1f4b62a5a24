//! Order repository trait definition.

use uuid::Uuid;
use vendly_types::error::RepositoryError;
use vendly_types::order::{Order, OrderAction};

/// Repository trait for orders and their transition audit rows.
pub trait OrderRepository: Send + Sync {
    fn get(
        &self,
        order_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    /// The customer's most recent order still in PENDING status, if any.
    fn find_pending_for_customer(
        &self,
        customer_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Order>, RepositoryError>> + Send;

    fn create(
        &self,
        order: &Order,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomically update the order's status (and optional payment-proof
    /// path) and insert the action row. One transaction or nothing.
    fn apply_transition(
        &self,
        order: &Order,
        action: &OrderAction,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
