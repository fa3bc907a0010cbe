//! The unified error handling system for the application.

pub use gateway::{GatewayError, KeyFailureKind};
pub use types::ProxyError;

/// Result type for startup and configuration paths.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Result type used by the failover gateway.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

pub mod gateway;
pub mod macros;
pub mod types;
