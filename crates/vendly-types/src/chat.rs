//! Customer, conversation, and catalog types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::Message;
use crate::order::Order;
use crate::transport::MessageKind;

/// A customer identified by their transport address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    /// Transport-level address (e.g., a phone-number JID). Unique.
    pub address: String,
    pub name: Option<String>,
    /// Preferred language code (e.g., "en", "id").
    pub language: Option<String>,
    /// Blocked customers are dropped silently by the pipeline.
    pub blocked: bool,
    pub total_orders: u32,
    /// Lifetime spend in minor units, incremented when orders complete.
    pub total_spent_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            other => Err(format!("invalid direction: '{other}'")),
        }
    }
}

/// An ongoing conversation between a customer and a managed account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub account_id: Uuid,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

/// A single persisted conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub direction: Direction,
    pub kind: MessageKind,
    pub content: String,
    /// Stored path of downloaded media, if any.
    pub media_path: Option<String>,
    /// Provider that generated this reply (outbound only).
    pub provider_id: Option<Uuid>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// A sellable package from the business catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePackage {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Price in minor units.
    pub price_cents: i64,
    pub currency: String,
    pub active: bool,
}

/// Derived, ephemeral context for one generation call.
///
/// Rebuilt per invocation from the datastore; never cached across calls.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    pub customer: Customer,
    /// Most recent history window, oldest first.
    pub history: Vec<Message>,
    pub pending_order: Option<Order>,
    pub selected_package: Option<ServicePackage>,
    /// Business catalog snapshot.
    pub catalog: Vec<ServicePackage>,
    /// Business profile/persona text injected into the system prompt.
    pub business_profile: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_roundtrip() {
        for dir in [Direction::Inbound, Direction::Outbound] {
            let parsed: Direction = dir.to_string().parse().unwrap();
            assert_eq!(dir, parsed);
        }
    }

    #[test]
    fn test_customer_serde() {
        let customer = Customer {
            id: Uuid::now_v7(),
            address: "6281234@s.whatsapp.net".to_string(),
            name: Some("Ari".to_string()),
            language: Some("id".to_string()),
            blocked: false,
            total_orders: 3,
            total_spent_cents: 450_000,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&customer).unwrap();
        let back: Customer = serde_json::from_str(&json).unwrap();
        assert_eq!(back.address, customer.address);
        assert_eq!(back.total_spent_cents, 450_000);
    }
}
