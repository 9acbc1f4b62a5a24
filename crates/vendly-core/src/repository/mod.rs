//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (vendly-infra) implements. The core crate never depends on any specific
//! storage technology.

pub mod catalog;
pub mod conversation;
pub mod customer;
pub mod order;
pub mod provider;
pub mod session;
