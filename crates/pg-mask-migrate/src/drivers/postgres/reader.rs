//! PostgreSQL source reader.

use async_trait::async_trait;
use tracing::debug;

use super::executor::PgExecutor;
use crate::core::identifier::quote_table;
use crate::core::traits::{Executor, SourceReader};
use crate::core::value::RowSet;
use crate::drivers::common::RetryingExecutor;
use crate::error::{MigrateError, Result};
use crate::pipeline::ExtractQuery;

/// Reads the production source through the retrying executor.
pub struct PgSource {
    exec: RetryingExecutor<PgExecutor>,
}

impl PgSource {
    pub fn new(exec: RetryingExecutor<PgExecutor>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl SourceReader for PgSource {
    async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_table(table)?);
        let rows = self.exec.query(&sql, &[]).await?;
        rows.rows
            .first()
            .and_then(|r| r.first())
            .and_then(|v| v.as_i64())
            .ok_or_else(|| MigrateError::extract(table, "COUNT(*) returned no value"))
    }

    async fn read_rows(&self, query: &ExtractQuery) -> Result<RowSet> {
        let (sql, params) = query.to_sql()?;
        debug!("extract {}: {}", query.table, sql);
        self.exec.query(&sql, &params).await
    }
}
