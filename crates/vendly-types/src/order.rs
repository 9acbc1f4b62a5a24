//! Order lifecycle types and the fixed status transition table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a customer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PaymentSubmitted,
    Paid,
    Rejected,
    Cancelled,
    Completed,
    Refunded,
}

impl OrderStatus {
    /// The fixed transition table. Statuses not listed as targets are not
    /// reachable from the given status; terminal statuses allow nothing.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::PaymentSubmitted, OrderStatus::Cancelled],
            OrderStatus::PaymentSubmitted => {
                &[OrderStatus::Paid, OrderStatus::Rejected, OrderStatus::Cancelled]
            }
            OrderStatus::Paid => &[OrderStatus::Completed, OrderStatus::Refunded],
            OrderStatus::Rejected
            | OrderStatus::Cancelled
            | OrderStatus::Completed
            | OrderStatus::Refunded => &[],
        }
    }

    /// Whether `to` is a legal next status from `self`.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// An order still awaiting payment proof.
    pub fn is_pending_payment(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::PaymentSubmitted => write!(f, "PAYMENT_SUBMITTED"),
            OrderStatus::Paid => write!(f, "PAID"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Completed => write!(f, "COMPLETED"),
            OrderStatus::Refunded => write!(f, "REFUNDED"),
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAYMENT_SUBMITTED" => Ok(OrderStatus::PaymentSubmitted),
            "PAID" => Ok(OrderStatus::Paid),
            "REJECTED" => Ok(OrderStatus::Rejected),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(format!("invalid order status: '{other}'")),
        }
    }
}

/// A customer order with a price snapshot taken at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    /// Human-facing order reference (e.g., "VND-20260830-7F3A").
    pub reference: String,
    pub customer_id: Uuid,
    pub package_id: Uuid,
    pub account_id: Uuid,
    pub status: OrderStatus,
    /// Price snapshot in minor units (cents), frozen at creation.
    pub price_cents: i64,
    pub currency: String,
    /// Stored path of the payment-proof media, once submitted.
    pub payment_proof_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit row recording one status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    /// Admin/operator who triggered the transition, if any.
    pub actor_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Errors from order operations.
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order not found")]
    NotFound,

    #[error("package not found")]
    PackageNotFound,

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<crate::error::RepositoryError> for OrderError {
    fn from(err: crate::error::RepositoryError) -> Self {
        OrderError::Storage(err.to_string())
    }
}
