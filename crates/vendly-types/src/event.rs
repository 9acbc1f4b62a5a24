//! Engine events published to realtime subscribers.
//!
//! Fire-and-forget: the core publishes, external collaborators (dashboard
//! fan-out, webhooks) subscribe. The core never depends on the delivery
//! transport.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::order::OrderStatus;
use crate::transport::AccountStatus;

/// Events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A normalized inbound message was accepted by the pipeline.
    MessageReceived {
        account_id: Uuid,
        conversation_id: Uuid,
        customer_id: Uuid,
        preview: String,
    },

    /// A generated reply was persisted and sent.
    ReplySent {
        account_id: Uuid,
        conversation_id: Uuid,
        provider_name: String,
        latency_ms: u64,
    },

    /// An order moved to a new status.
    OrderStatusChanged {
        order_id: Uuid,
        customer_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A pairing code/QR payload for operator display.
    PairingCode { account_id: Uuid, code: String },

    /// An account's connection state changed.
    ConnectionState {
        account_id: Uuid,
        status: AccountStatus,
    },

    /// An account settled into DISCONNECTED with no further automatic
    /// reconnection (logout, ban, or reconnect attempts exhausted).
    AccountDisconnected { account_id: Uuid, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_tagging() {
        let event = EngineEvent::PairingCode {
            account_id: Uuid::now_v7(),
            code: "ABCD-1234".to_string(),
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "pairing_code");
        assert_eq!(value["code"], "ABCD-1234");
    }

    #[test]
    fn test_order_event_carries_statuses() {
        let event = EngineEvent::OrderStatusChanged {
            order_id: Uuid::now_v7(),
            customer_id: Uuid::now_v7(),
            from: OrderStatus::Pending,
            to: OrderStatus::PaymentSubmitted,
        };
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["from"], "PENDING");
        assert_eq!(value["to"], "PAYMENT_SUBMITTED");
    }
}
