//! Core traits for the masked migration engine.
//!
//! - [`Executor`]: transactional SQL execution, wrapped by the retry policy
//! - [`SourceReader`]: reads rows and counts from the production source
//! - [`TargetWriter`]: cleans, upserts and audits on the QA target
//! - [`Connector`]: opens one reader and one writer per run
//!
//! The PostgreSQL driver implements all four; the in-memory backend
//! implements the last three for tests and local experiments.

use async_trait::async_trait;

use crate::audit::AuditRow;
use crate::error::Result;
use crate::logging::RunLog;
use crate::pipeline::{ExtractQuery, UpsertPlan};

use super::value::{RowSet, SqlValue};

/// Execute SQL statements on one open connection.
///
/// Every method runs a single attempt. Retries live in
/// [`RetryingExecutor`](crate::drivers::common::RetryingExecutor).
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a query and return its rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet>;

    /// Run a statement and return the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run one multi-row statement inside its own transaction.
    ///
    /// `rows` are flattened row-major into the statement's placeholders.
    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64>;

    /// Roll back whatever transaction is active on the connection.
    async fn rollback(&self) -> Result<()>;
}

/// Read data from the source database.
///
/// The connection closes when the reader is dropped.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Count every row of a table, ignoring filters.
    async fn count_rows(&self, table: &str) -> Result<i64>;

    /// Run an extract query and return the matching rows.
    async fn read_rows(&self, query: &ExtractQuery) -> Result<RowSet>;
}

/// Write masked data to the target database.
///
/// The connection closes when the writer is dropped.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Delete every row of a table. Returns the number of rows removed.
    async fn delete_all(&self, table: &str) -> Result<u64>;

    /// Upsert one page of rows according to the plan.
    ///
    /// The page is atomic: either every row is applied or none is.
    async fn upsert_page(&self, plan: &UpsertPlan, rows: &[Vec<SqlValue>]) -> Result<u64>;

    /// Insert one row into the audit table.
    async fn insert_audit(&self, table: &str, row: &AuditRow) -> Result<()>;
}

/// Open source and target connections for a run.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the source, retrying per the configured policy.
    async fn connect_source(&self, log: &RunLog) -> Result<Box<dyn SourceReader>>;

    /// Connect to the target, retrying per the configured policy.
    async fn connect_target(&self, log: &RunLog) -> Result<Box<dyn TargetWriter>>;
}
