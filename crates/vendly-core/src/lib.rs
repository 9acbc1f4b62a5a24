//! Business logic and port definitions for Vendly.
//!
//! This crate defines the "ports" (repository, transport, and generation
//! traits) that the infrastructure layer implements, plus the services
//! built on them: the provider dispatcher, connection manager, session
//! store, and conversation pipeline. It depends only on `vendly-types` --
//! never on `vendly-infra` or any database/IO crate.

pub mod event;
pub mod llm;
pub mod pipeline;
pub mod repository;
pub mod session;
pub mod transport;
