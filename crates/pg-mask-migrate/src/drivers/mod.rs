//! Database backends implementing the core traits.
//!
//! - [`postgres`]: tokio-postgres source, target and connector
//! - [`memory`]: in-memory source and target with failure injection
//! - [`common`]: retry policy and TLS setup shared by the backends

pub mod common;
pub mod memory;
pub mod postgres;

pub use common::{RetryPolicy, RetryingExecutor, SslMode, TlsBuilder};
pub use memory::MemoryDatabase;
pub use postgres::PgConnector;
