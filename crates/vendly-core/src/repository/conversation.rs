//! Conversation and message repository trait definition.

use uuid::Uuid;
use vendly_types::chat::{ChatMessage, Conversation};
use vendly_types::error::RepositoryError;

/// Repository trait for conversations and their messages.
pub trait ConversationRepository: Send + Sync {
    /// Find the active conversation between a customer and an account.
    fn find_active(
        &self,
        customer_id: &Uuid,
        account_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Conversation>, RepositoryError>> + Send;

    /// Create a new conversation.
    fn create(
        &self,
        conversation: &Conversation,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Bump the conversation's last-activity timestamp.
    fn touch(
        &self,
        conversation_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Persist a conversation message.
    fn save_message(
        &self,
        message: &ChatMessage,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Most recent messages for a conversation, newest first, capped at `limit`.
    fn recent_messages(
        &self,
        conversation_id: &Uuid,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, RepositoryError>> + Send;
}
