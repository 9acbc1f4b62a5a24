//! Order lifecycle service.
//!
//! Creates orders with a price snapshot and drives status transitions
//! through the fixed transition table. Every transition writes the order
//! update and its audit action atomically through the repository, then
//! notifies the customer from the matching template (when one is
//! configured) and publishes the change on the event bus.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use vendly_types::chat::Customer;
use vendly_types::event::EngineEvent;
use vendly_types::order::{Order, OrderAction, OrderError, OrderStatus};

use crate::event::EventBus;
use crate::repository::catalog::{CatalogRepository, render_template};
use crate::repository::customer::CustomerRepository;
use crate::repository::order::OrderRepository;

use super::context::format_price;
use super::gateway::OutboundGateway;

pub struct OrderService<O, C, K, G> {
    orders: O,
    customers: C,
    catalog: K,
    gateway: G,
    bus: EventBus,
}

impl<O, C, K, G> OrderService<O, C, K, G>
where
    O: OrderRepository,
    C: CustomerRepository,
    K: CatalogRepository,
    G: OutboundGateway,
{
    pub fn new(orders: O, customers: C, catalog: K, gateway: G, bus: EventBus) -> Self {
        Self {
            orders,
            customers,
            catalog,
            gateway,
            bus,
        }
    }

    /// Create a PENDING order for the customer, snapshotting the package
    /// price, and send them the payment instructions.
    pub async fn create_order(
        &self,
        customer: &Customer,
        account_id: Uuid,
        package_id: Uuid,
    ) -> Result<Order, OrderError> {
        let package = self
            .catalog
            .get_package(&package_id)
            .await?
            .ok_or(OrderError::PackageNotFound)?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::now_v7(),
            reference: generate_reference(),
            customer_id: customer.id,
            package_id,
            account_id,
            status: OrderStatus::Pending,
            price_cents: package.price_cents,
            currency: package.currency.clone(),
            payment_proof_path: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.create(&order).await?;
        tracing::info!(
            reference = %order.reference,
            customer = %customer.address,
            package = %package.name,
            "Order created"
        );

        let mut values = HashMap::new();
        values.insert("reference", order.reference.clone());
        values.insert("package", package.name.clone());
        values.insert("price", format_price(order.price_cents, &order.currency));
        self.send_template(account_id, &customer.address, "payment_instructions", &values)
            .await;

        Ok(order)
    }

    /// The customer's most recent order still awaiting payment, if any.
    pub async fn find_pending(&self, customer_id: &Uuid) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.find_pending_for_customer(customer_id).await?)
    }

    /// Record a received payment proof: attach the stored media path and
    /// move the order to PAYMENT_SUBMITTED.
    pub async fn submit_payment_proof(
        &self,
        order: &Order,
        proof_path: Option<String>,
    ) -> Result<Order, OrderError> {
        self.transition(
            order,
            OrderStatus::PaymentSubmitted,
            None,
            Some("payment proof received".to_string()),
            proof_path,
        )
        .await
    }

    /// Operator-driven status change, validated against the transition
    /// table.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        actor_id: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = self.orders.get(&order_id).await?.ok_or(OrderError::NotFound)?;
        self.transition(&order, to, actor_id, notes, None).await
    }

    async fn transition(
        &self,
        order: &Order,
        to: OrderStatus,
        actor_id: Option<Uuid>,
        notes: Option<String>,
        proof_path: Option<String>,
    ) -> Result<Order, OrderError> {
        if !order.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        let mut updated = order.clone();
        updated.status = to;
        updated.updated_at = Utc::now();
        if proof_path.is_some() {
            updated.payment_proof_path = proof_path;
        }

        let action = OrderAction {
            id: Uuid::now_v7(),
            order_id: order.id,
            from_status: order.status,
            to_status: to,
            actor_id,
            notes,
            created_at: updated.updated_at,
        };
        self.orders.apply_transition(&updated, &action).await?;
        tracing::info!(
            reference = %order.reference,
            from = %order.status,
            to = %to,
            "Order status changed"
        );

        if to == OrderStatus::Completed {
            if let Err(err) = self
                .customers
                .record_completed_order(&order.customer_id, order.price_cents)
                .await
            {
                tracing::error!(
                    reference = %order.reference,
                    error = %err,
                    "Failed to update customer aggregates"
                );
            }
        }

        if let Some(key) = status_template_key(to) {
            match self.customers.get(&order.customer_id).await {
                Ok(Some(customer)) => {
                    let mut values = HashMap::new();
                    values.insert("reference", updated.reference.clone());
                    values.insert("price", format_price(updated.price_cents, &updated.currency));
                    self.send_template(updated.account_id, &customer.address, key, &values)
                        .await;
                }
                Ok(None) => {
                    tracing::warn!(reference = %order.reference, "Order customer missing, skipping notification");
                }
                Err(err) => {
                    tracing::warn!(reference = %order.reference, error = %err, "Customer lookup failed, skipping notification");
                }
            }
        }

        self.bus.publish(EngineEvent::OrderStatusChanged {
            order_id: order.id,
            customer_id: order.customer_id,
            from: order.status,
            to,
        });

        Ok(updated)
    }

    /// Render and send a configured template. Missing templates and send
    /// failures are logged, never fatal to the transition they follow.
    async fn send_template(
        &self,
        account_id: Uuid,
        recipient: &str,
        key: &str,
        values: &HashMap<&str, String>,
    ) {
        match self.catalog.get_template(key).await {
            Ok(Some(body)) => {
                let text = render_template(&body, values);
                if let Err(err) = self.gateway.send_text(account_id, recipient, &text).await {
                    tracing::warn!(recipient, key, error = %err, "Template send failed");
                }
            }
            Ok(None) => {
                tracing::debug!(key, "No template configured, skipping notification");
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "Template lookup failed");
            }
        }
    }
}

fn status_template_key(status: OrderStatus) -> Option<&'static str> {
    match status {
        OrderStatus::PaymentSubmitted => Some("payment_confirmation"),
        OrderStatus::Paid => Some("order_paid"),
        OrderStatus::Rejected => Some("payment_rejected"),
        OrderStatus::Cancelled => Some("order_cancelled"),
        OrderStatus::Completed => Some("order_completed"),
        OrderStatus::Refunded => Some("order_refunded"),
        OrderStatus::Pending => None,
    }
}

/// Human-facing order reference: date plus a short random suffix.
fn generate_reference() -> String {
    let id = Uuid::now_v7().simple().to_string();
    format!(
        "VND-{}-{}",
        Utc::now().format("%Y%m%d"),
        id[28..].to_uppercase()
    )
}
