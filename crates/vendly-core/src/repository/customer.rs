//! Customer repository trait definition.

use uuid::Uuid;
use vendly_types::chat::Customer;
use vendly_types::error::RepositoryError;

/// Repository trait for customer persistence.
pub trait CustomerRepository: Send + Sync {
    fn get(
        &self,
        customer_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Customer>, RepositoryError>> + Send;

    /// Find a customer by their transport address.
    fn find_by_address(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Option<Customer>, RepositoryError>> + Send;

    /// Create a new customer record.
    fn create(
        &self,
        customer: &Customer,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Increment completed-order aggregates (order count and lifetime spend).
    fn record_completed_order(
        &self,
        customer_id: &Uuid,
        amount_cents: i64,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
