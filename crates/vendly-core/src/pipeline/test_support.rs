//! In-memory repositories and a recording gateway shared by the pipeline
//! test suites.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use vendly_types::chat::{ChatMessage, Conversation, Customer, ServicePackage};
use vendly_types::error::RepositoryError;
use vendly_types::order::{Order, OrderAction};
use vendly_types::transport::{MediaRef, TransportError};

use crate::repository::catalog::CatalogRepository;
use crate::repository::conversation::ConversationRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::order::OrderRepository;

use super::gateway::OutboundGateway;

/// One in-memory store implementing every repository port the pipeline
/// touches. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    customers: Mutex<Vec<Customer>>,
    conversations: Mutex<Vec<Conversation>>,
    messages: Mutex<Vec<ChatMessage>>,
    orders: Mutex<Vec<Order>>,
    actions: Mutex<Vec<OrderAction>>,
    packages: Mutex<Vec<ServicePackage>>,
    templates: Mutex<HashMap<String, String>>,
    profile: Mutex<String>,
}

impl MemoryStore {
    pub fn insert_customer(&self, customer: Customer) {
        self.inner.customers.lock().unwrap().push(customer);
    }

    pub fn insert_order(&self, order: Order) {
        self.inner.orders.lock().unwrap().push(order);
    }

    pub fn insert_package(&self, package: ServicePackage) {
        self.inner.packages.lock().unwrap().push(package);
    }

    pub fn insert_template(&self, key: &str, body: &str) {
        self.inner
            .templates
            .lock()
            .unwrap()
            .insert(key.to_string(), body.to_string());
    }

    pub fn set_profile(&self, profile: &str) {
        *self.inner.profile.lock().unwrap() = profile.to_string();
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.inner.customers.lock().unwrap().clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.inner.orders.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<OrderAction> {
        self.inner.actions.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.messages.lock().unwrap().clone()
    }
}

impl CustomerRepository for MemoryStore {
    async fn get(&self, customer_id: &Uuid) -> Result<Option<Customer>, RepositoryError> {
        Ok(self
            .inner
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == *customer_id)
            .cloned())
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<Customer>, RepositoryError> {
        Ok(self
            .inner
            .customers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.address == address)
            .cloned())
    }

    async fn create(&self, customer: &Customer) -> Result<(), RepositoryError> {
        self.inner.customers.lock().unwrap().push(customer.clone());
        Ok(())
    }

    async fn record_completed_order(
        &self,
        customer_id: &Uuid,
        amount_cents: i64,
    ) -> Result<(), RepositoryError> {
        let mut customers = self.inner.customers.lock().unwrap();
        let customer = customers
            .iter_mut()
            .find(|c| c.id == *customer_id)
            .ok_or(RepositoryError::NotFound)?;
        customer.total_orders += 1;
        customer.total_spent_cents += amount_cents;
        Ok(())
    }
}

impl ConversationRepository for MemoryStore {
    async fn find_active(
        &self,
        customer_id: &Uuid,
        account_id: &Uuid,
    ) -> Result<Option<Conversation>, RepositoryError> {
        Ok(self
            .inner
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.customer_id == *customer_id && c.account_id == *account_id && c.active)
            .cloned())
    }

    async fn create(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        self.inner
            .conversations
            .lock()
            .unwrap()
            .push(conversation.clone());
        Ok(())
    }

    async fn touch(&self, conversation_id: &Uuid) -> Result<(), RepositoryError> {
        let mut conversations = self.inner.conversations.lock().unwrap();
        if let Some(conversation) = conversations.iter_mut().find(|c| c.id == *conversation_id) {
            conversation.last_message_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<(), RepositoryError> {
        self.inner.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: &Uuid,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let messages = self.inner.messages.lock().unwrap();
        Ok(messages
            .iter()
            .filter(|m| m.conversation_id == *conversation_id)
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

impl OrderRepository for MemoryStore {
    async fn get(&self, order_id: &Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .inner
            .orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == *order_id)
            .cloned())
    }

    async fn find_pending_for_customer(
        &self,
        customer_id: &Uuid,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .inner
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.customer_id == *customer_id && o.status.is_pending_payment())
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        self.inner.orders.lock().unwrap().push(order.clone());
        Ok(())
    }

    async fn apply_transition(
        &self,
        order: &Order,
        action: &OrderAction,
    ) -> Result<(), RepositoryError> {
        let mut orders = self.inner.orders.lock().unwrap();
        let stored = orders
            .iter_mut()
            .find(|o| o.id == order.id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = order.clone();
        self.inner.actions.lock().unwrap().push(action.clone());
        Ok(())
    }
}

impl CatalogRepository for MemoryStore {
    async fn list_active_packages(&self) -> Result<Vec<ServicePackage>, RepositoryError> {
        Ok(self
            .inner
            .packages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.active)
            .cloned()
            .collect())
    }

    async fn get_package(
        &self,
        package_id: &Uuid,
    ) -> Result<Option<ServicePackage>, RepositoryError> {
        Ok(self
            .inner
            .packages
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == *package_id)
            .cloned())
    }

    async fn get_template(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.inner.templates.lock().unwrap().get(key).cloned())
    }

    async fn business_profile(&self) -> Result<String, RepositoryError> {
        Ok(self.inner.profile.lock().unwrap().clone())
    }
}

/// Records outbound sends instead of hitting a transport.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    pub sent: Arc<Mutex<Vec<(Uuid, String, String)>>>,
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl OutboundGateway for RecordingGateway {
    async fn send_text(
        &self,
        account_id: Uuid,
        recipient: &str,
        body: &str,
    ) -> Result<(), TransportError> {
        self.sent
            .lock()
            .unwrap()
            .push((account_id, recipient.to_string(), body.to_string()));
        Ok(())
    }

    async fn fetch_media(&self, _account_id: Uuid, media: &MediaRef) -> Option<PathBuf> {
        self.fetched.lock().unwrap().push(media.id.clone());
        Some(PathBuf::from(format!("/tmp/media-{}.bin", media.id)))
    }
}
