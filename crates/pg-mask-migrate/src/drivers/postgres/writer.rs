//! PostgreSQL target writer.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};

use super::executor::PgExecutor;
use crate::audit::AuditRow;
use crate::core::identifier::{quote_columns, quote_table};
use crate::core::traits::{Executor, TargetWriter};
use crate::core::value::SqlValue;
use crate::drivers::common::RetryingExecutor;
use crate::error::Result;
use crate::pipeline::UpsertPlan;

/// Writes to the QA target through the retrying executor.
pub struct PgTarget {
    exec: RetryingExecutor<PgExecutor>,
}

impl PgTarget {
    pub fn new(exec: RetryingExecutor<PgExecutor>) -> Self {
        Self { exec }
    }
}

/// `INSERT` statement and parameters for one audit row.
pub fn audit_insert(table: &str, row: &AuditRow) -> Result<(String, Vec<SqlValue>)> {
    let values = vec![
        SqlValue::Text(row.execution_id.clone()),
        SqlValue::DateTimeOffset(DateTime::<FixedOffset>::from(row.started_at)),
        SqlValue::DateTimeOffset(DateTime::<FixedOffset>::from(row.finished_at)),
        SqlValue::Text(row.tables_processed.clone()),
        SqlValue::I64(row.total_rows),
        SqlValue::Text(row.detail_json.clone()),
    ];
    let placeholders: Vec<String> = values
        .iter()
        .enumerate()
        .map(|(i, v)| v.placeholder(i + 1))
        .collect();

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_table(table)?,
        quote_columns(&AuditRow::COLUMNS)?,
        placeholders.join(", ")
    );
    Ok((sql, values))
}

#[async_trait]
impl TargetWriter for PgTarget {
    async fn delete_all(&self, table: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {}", quote_table(table)?);
        self.exec.execute(&sql, &[]).await
    }

    async fn upsert_page(&self, plan: &UpsertPlan, rows: &[Vec<SqlValue>]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = plan.to_sql(rows)?;
        self.exec.execute_batch(&sql, rows).await
    }

    async fn insert_audit(&self, table: &str, row: &AuditRow) -> Result<()> {
        let (sql, params) = audit_insert(table, row)?;
        self.exec.execute(&sql, &params).await?;
        Ok(())
    }
}
