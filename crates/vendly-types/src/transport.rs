//! Messaging-transport types: account state, inbound payloads, and the
//! normalized message model the pipeline consumes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::CredentialState;

/// Connection state of a managed transport account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Connecting,
    Connected,
    Disconnected,
    Banned,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Connecting => write!(f, "connecting"),
            AccountStatus::Connected => write!(f, "connected"),
            AccountStatus::Disconnected => write!(f, "disconnected"),
            AccountStatus::Banned => write!(f, "banned"),
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connecting" => Ok(AccountStatus::Connecting),
            "connected" => Ok(AccountStatus::Connected),
            "disconnected" => Ok(AccountStatus::Disconnected),
            "banned" => Ok(AccountStatus::Banned),
            other => Err(format!("invalid account status: '{other}'")),
        }
    }
}

/// Closed set of normalized message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Image => write!(f, "image"),
            MessageKind::Video => write!(f, "video"),
            MessageKind::Audio => write!(f, "audio"),
            MessageKind::Document => write!(f, "document"),
            MessageKind::Sticker => write!(f, "sticker"),
            MessageKind::Location => write!(f, "location"),
            MessageKind::Contact => write!(f, "contact"),
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "video" => Ok(MessageKind::Video),
            "audio" => Ok(MessageKind::Audio),
            "document" => Ok(MessageKind::Document),
            "sticker" => Ok(MessageKind::Sticker),
            "location" => Ok(MessageKind::Location),
            "contact" => Ok(MessageKind::Contact),
            other => Err(format!("invalid message kind: '{other}'")),
        }
    }
}

/// Opaque reference to downloadable media held by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub mime_type: String,
}

/// Raw inbound payload as the transport hands it over, before normalization.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Text { body: String },
    Image { caption: Option<String>, media: MediaRef },
    Video { caption: Option<String>, media: MediaRef },
    Audio { media: MediaRef },
    Document { file_name: String, media: MediaRef },
    Sticker { media: MediaRef },
    Location { latitude: f64, longitude: f64, name: Option<String> },
    Contact { display_name: String, vcard: String },
}

/// A raw inbound message from the transport.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Transport-level sender address (e.g., a phone-number JID).
    pub sender: String,
    /// Sender display name if the transport knows it.
    pub sender_name: Option<String>,
    /// Whether the message originated in a group chat.
    pub from_group: bool,
    pub payload: RawPayload,
    pub timestamp: DateTime<Utc>,
}

/// A normalized inbound message, ready for the conversation pipeline.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub account_id: Uuid,
    pub sender: String,
    pub sender_name: Option<String>,
    pub from_group: bool,
    pub kind: MessageKind,
    /// Plain-text representation. Non-text kinds get a human-readable
    /// placeholder (e.g., "[image] holiday photo").
    pub text: String,
    /// Present for kinds with downloadable media.
    pub media: Option<MediaRef>,
    pub timestamp: DateTime<Utc>,
}

/// Why a transport connection closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit logout. Terminal: stored session is cleared, no reconnect.
    LoggedOut,
    /// Account banned by the transport. Terminal.
    Banned,
    /// Anything else (network drop, server restart). Reconnectable.
    Recoverable(String),
}

impl DisconnectReason {
    /// Terminal reasons never trigger automatic reconnection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut | DisconnectReason::Banned)
    }
}

/// Events a live transport connection emits to the connection manager.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A pairing code/QR payload to show the operator. May fire repeatedly.
    PairingCode(String),
    /// The session handshake completed; the connection is usable.
    Connected,
    /// The transport rotated or established credentials; persist them.
    CredentialsUpdated(CredentialState),
    /// An inbound message arrived.
    Message(RawMessage),
    /// The connection closed.
    Closed(DisconnectReason),
}

/// Errors from connection-manager and transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("account {0} is not connected")]
    NotConnected(Uuid),

    #[error("account {0} is not managed")]
    UnknownAccount(Uuid),

    #[error("account limit reached ({0} accounts)")]
    AccountLimitReached(usize),

    #[error("rate limit exceeded for recipient {0}")]
    RateLimited(String),

    #[error("send timed out after {0}ms")]
    SendTimeout(u64),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("session storage error: {0}")]
    Session(String),
}
