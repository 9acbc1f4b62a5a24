//! Generation routing: provider traits, health tracking, and the
//! multi-provider dispatcher.

pub mod box_provider;
pub mod dispatcher;
pub mod health;
pub mod provider;

pub use box_provider::{BoxGenerationBackend, GenerationBackendDyn};
pub use dispatcher::{DispatcherSettings, ProviderDispatcher};
pub use health::{CircuitState, ProviderHealth};
pub use provider::GenerationBackend;
