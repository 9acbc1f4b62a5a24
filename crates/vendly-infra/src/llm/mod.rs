//! Generation backend implementations.

pub mod openai_compat;

pub use openai_compat::{backend_for, OpenAiCompatibleBackend};
