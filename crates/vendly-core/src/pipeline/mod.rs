//! Conversation pipeline: per-sender slots, context assembly, the order
//! lifecycle service, and the inbound message flow.

pub mod context;
pub mod gateway;
pub mod orders;
pub mod service;
pub mod slots;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::ContextBuilder;
pub use gateway::OutboundGateway;
pub use orders::OrderService;
pub use service::{ConversationPipeline, PipelineError, PipelineSettings};
pub use slots::ProcessingSlots;
