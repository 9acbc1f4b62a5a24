//! Provider repository trait definition.
//!
//! Storage interface for generation-provider configuration, quota counters,
//! and usage audit rows. Uses native async fn in traits (Rust 2024 edition,
//! no async_trait macro).

use uuid::Uuid;
use vendly_types::error::RepositoryError;
use vendly_types::llm::{ProviderConfig, UsageRecord};

/// Repository trait for generation-provider persistence.
pub trait ProviderRepository: Send + Sync {
    /// Load all provider configurations, ordered by priority descending.
    /// Credentials arrive decrypted (in-memory only).
    fn list_configs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ProviderConfig>, RepositoryError>> + Send;

    /// Atomically increment the provider's daily usage counter and insert
    /// the usage audit row. Both happen in one transaction or not at all.
    fn record_usage(
        &self,
        record: &UsageRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist the explicit exhausted-for-today flag so the state survives
    /// a provider reload.
    fn mark_exhausted(
        &self,
        provider_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Daily reset: zero every usage counter and clear exhausted flags.
    fn reset_daily_usage(
        &self,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
