//! Encrypted credential storage for transport accounts.

pub mod store;

pub use store::{SecretSealer, SessionStore, SessionStoreError};
