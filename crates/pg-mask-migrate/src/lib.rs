//! # pg-mask-migrate
//!
//! Masked PostgreSQL to PostgreSQL migration library.
//!
//! Copies configured tables from a production database into a QA database,
//! masking sensitive columns on the way:
//!
//! - **Role gate** deciding which roles may dry-run, load incrementally or fully reload
//! - **Masking rules** per column (salted e-mail hash, last-4 redaction, synthetic values)
//! - **Incremental loads** driven by per-table integer watermarks in a JSON state file
//! - **Batched upserts** with per-table conflict policies
//! - **Audit trail** in a local history file and an audit table on the target
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_mask_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> pg_mask_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::with_postgres(config)?;
//!     let report = orchestrator.execute("operator", "2").await;
//!     println!("{}", report.transcript);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod logging;
pub mod masking;
pub mod orchestrator;
pub mod pipeline;
pub mod rbac;
pub mod state;

// Re-exports for convenient access
pub use audit::{ExecutionRecord, HistoryLog, Outcome, TableStats};
pub use config::{Config, LoadDescriptor, MigrationConfig, TableSpec};
pub use drivers::{MemoryDatabase, PgConnector};
pub use error::{MigrateError, Result};
pub use logging::RunLog;
pub use masking::{MaskingEngine, MaskingRule};
pub use orchestrator::{Orchestrator, RunReport, TableCount};
pub use rbac::{authorize, Operation, Role};
pub use state::WatermarkState;
