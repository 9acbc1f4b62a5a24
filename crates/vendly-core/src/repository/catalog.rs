//! Catalog repository trait definition: packages and message templates.

use std::collections::HashMap;

use uuid::Uuid;
use vendly_types::chat::ServicePackage;
use vendly_types::error::RepositoryError;

/// Repository trait for the business catalog and notification templates.
pub trait CatalogRepository: Send + Sync {
    /// All active packages (the catalog snapshot for generation context).
    fn list_active_packages(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<ServicePackage>, RepositoryError>> + Send;

    fn get_package(
        &self,
        package_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ServicePackage>, RepositoryError>> + Send;

    /// A message template body by key (e.g., "payment_instructions",
    /// "payment_confirmation", "order_paid").
    fn get_template(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, RepositoryError>> + Send;

    /// Business profile/persona text for the system prompt.
    fn business_profile(
        &self,
    ) -> impl std::future::Future<Output = Result<String, RepositoryError>> + Send;
}

/// Fill `{placeholder}` slots in a template body.
///
/// Unknown placeholders are left as-is so a typo in a template is visible
/// in the delivered text instead of silently vanishing.
pub fn render_template(body: &str, values: &HashMap<&str, String>) -> String {
    let mut out = body.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
