//! Shared domain types for Vendly.
//!
//! This crate contains the core domain types used across the Vendly engine:
//! generation providers, transport accounts and messages, encrypted session
//! state, orders, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror,
//! base64, and secrecy.

pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod order;
pub mod session;
pub mod transport;
