//! Utilities shared by the drivers.
//!
//! - [`tls`]: TLS configuration and client opening for PostgreSQL
//! - [`retry`]: fixed-delay retry policy and the retrying executor

pub mod retry;
pub mod tls;

pub use retry::{retry, RetryPolicy, RetryingExecutor};
pub use tls::{SslMode, TlsBuilder};
