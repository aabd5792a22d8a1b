//! Resilience for eventually-consistent operations
//!
//! Provides the bounded polling loop, its per-call-site configuration, and operation timing
//! logs.

pub mod config;
pub mod logging;
pub mod retry;

pub use config::{ResilienceConfig, ResilienceConfigBuilder};
pub use logging::{OperationContext, OperationLogger};
pub use retry::{Poll, RetryConfig, RetryPolicy, RetryableError};
