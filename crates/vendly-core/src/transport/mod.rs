//! Transport connectivity: connector ports, message normalization,
//! outbound rate limiting, and the multi-account connection manager.

pub mod connector;
pub mod manager;
pub mod normalize;
pub mod rate_limit;

pub use connector::{
    BoxTransportHandle, TransportConnection, TransportConnector, TransportHandle,
};
pub use manager::{ConnectionManager, ManagerSettings};
pub use normalize::normalize;
pub use rate_limit::RateLimiter;
