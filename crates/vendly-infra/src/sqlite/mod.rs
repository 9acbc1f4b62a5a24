//! SQLite persistence layer.
//!
//! One repository struct per aggregate, all sharing a split reader/writer
//! pool. SELECTs go through the reader pool; mutations go through the
//! single-connection writer to keep WAL writes serialized.

pub mod catalog;
pub mod conversation;
pub mod customer;
pub mod order;
pub mod pool;
pub mod provider;
pub mod session;

pub use catalog::SqliteCatalogRepository;
pub use conversation::SqliteConversationRepository;
pub use customer::SqliteCustomerRepository;
pub use order::SqliteOrderRepository;
pub use pool::{default_database_url, DatabasePool};
pub use provider::SqliteProviderRepository;
pub use session::SqliteSessionRepository;
