//! Raw transport payload normalization.
//!
//! Collapses the transport's payload variants into the flat
//! [`InboundMessage`] shape the pipeline consumes, with text placeholders
//! for non-text content so conversation history stays readable.

use uuid::Uuid;

use vendly_types::transport::{InboundMessage, MessageKind, RawMessage, RawPayload};

/// Flatten a raw transport message into the pipeline's inbound shape.
pub fn normalize(account_id: Uuid, raw: RawMessage) -> InboundMessage {
    let (kind, text, media) = match raw.payload {
        RawPayload::Text { body } => (MessageKind::Text, body, None),
        RawPayload::Image { caption, media } => {
            let text = match caption {
                Some(caption) if !caption.is_empty() => format!("[image] {caption}"),
                _ => "[image]".to_string(),
            };
            (MessageKind::Image, text, Some(media))
        }
        RawPayload::Video { caption, media } => {
            let text = match caption {
                Some(caption) if !caption.is_empty() => format!("[video] {caption}"),
                _ => "[video]".to_string(),
            };
            (MessageKind::Video, text, Some(media))
        }
        RawPayload::Audio { media } => (MessageKind::Audio, "[audio]".to_string(), Some(media)),
        RawPayload::Document { file_name, media } => (
            MessageKind::Document,
            format!("[document] {file_name}"),
            Some(media),
        ),
        RawPayload::Sticker { media } => {
            (MessageKind::Sticker, "[sticker]".to_string(), Some(media))
        }
        RawPayload::Location {
            latitude,
            longitude,
            name,
        } => {
            let text = match name {
                Some(name) if !name.is_empty() => {
                    format!("[location] {name} ({latitude}, {longitude})")
                }
                _ => format!("[location] ({latitude}, {longitude})"),
            };
            (MessageKind::Location, text, None)
        }
        RawPayload::Contact {
            display_name,
            vcard: _,
        } => (
            MessageKind::Contact,
            format!("[contact] {display_name}"),
            None,
        ),
    };

    InboundMessage {
        account_id,
        sender: raw.sender,
        sender_name: raw.sender_name,
        from_group: raw.from_group,
        kind,
        text,
        media,
        timestamp: raw.timestamp,
    }
}
