//! Infrastructure layer for Vendly.
//!
//! Contains implementations of the ports defined in `vendly-core`:
//! SQLite storage, the AES-256-GCM credential vault, the OpenAI-compatible
//! generation backend, and the configuration loader.

pub mod config;
pub mod crypto;
pub mod llm;
pub mod sqlite;
