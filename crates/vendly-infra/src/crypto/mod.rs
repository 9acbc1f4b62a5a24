//! Vault encryption for secrets at rest.

pub mod vault;

pub use vault::{VaultCrypto, VaultError};
