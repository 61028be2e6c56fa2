//! In-memory source and target, for tests and local experiments.
//!
//! One [`MemoryDatabase`] holds both sides. It supports failure injection per
//! connection, per source table and per target table, so every recoverable
//! and fatal path of a run can be exercised without a server.
//!
//! Free-form filter conditions are not evaluated; cursor predicates and
//! limits are.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::audit::AuditRow;
use crate::config::ConflictPolicy;
use crate::core::traits::{Connector, SourceReader, TargetWriter};
use crate::core::value::{RowSet, SqlValue};
use crate::drivers::common::{retry, RetryPolicy};
use crate::error::{MigrateError, Result};
use crate::logging::RunLog;
use crate::pipeline::{ExtractQuery, UpsertPlan};

#[derive(Debug, Default)]
struct Inner {
    source: HashMap<String, RowSet>,
    target: HashMap<String, RowSet>,
    audit: Vec<(String, AuditRow)>,
    failures: Failures,
    /// Source queries run, in order, as rendered SQL.
    queries: Vec<String>,
}

#[derive(Debug, Default)]
struct Failures {
    source_connects: u32,
    target_connects: u32,
    extract: HashSet<String>,
    deletes: HashSet<String>,
    /// Target table -> pages accepted before every later page fails.
    upserts: HashMap<String, usize>,
    audit: bool,
}

/// Shared in-memory source and target databases.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    inner: Arc<RwLock<Inner>>,
    policy: RetryPolicy,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
            policy: RetryPolicy::new(3, std::time::Duration::ZERO),
        }
    }

    /// Replace a source table's contents.
    pub async fn set_source_table(&self, name: &str, rows: RowSet) {
        self.inner.write().await.source.insert(name.to_string(), rows);
    }

    /// Live handles on this database, open connections included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Current rows of a target table, empty if never written.
    pub async fn target_table(&self, name: &str) -> RowSet {
        self.inner
            .read()
            .await
            .target
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn audit_rows(&self) -> Vec<(String, AuditRow)> {
        self.inner.read().await.audit.clone()
    }

    pub async fn source_queries(&self) -> Vec<String> {
        self.inner.read().await.queries.clone()
    }

    /// Fail the next `attempts` source connection attempts.
    pub async fn fail_source_connects(&self, attempts: u32) {
        self.inner.write().await.failures.source_connects = attempts;
    }

    /// Fail the next `attempts` target connection attempts.
    pub async fn fail_target_connects(&self, attempts: u32) {
        self.inner.write().await.failures.target_connects = attempts;
    }

    pub async fn fail_extract(&self, table: &str) {
        self.inner.write().await.failures.extract.insert(table.to_string());
    }

    pub async fn fail_delete(&self, table: &str) {
        self.inner.write().await.failures.deletes.insert(table.to_string());
    }

    /// Accept `ok_pages` pages into `table`, then fail every later page.
    pub async fn fail_upserts_after(&self, table: &str, ok_pages: usize) {
        self.inner
            .write()
            .await
            .failures
            .upserts
            .insert(table.to_string(), ok_pages);
    }

    pub async fn fail_audit(&self) {
        self.inner.write().await.failures.audit = true;
    }
}

#[async_trait]
impl Connector for MemoryDatabase {
    async fn connect_source(&self, log: &RunLog) -> Result<Box<dyn SourceReader>> {
        retry(&self.policy, log, "connect to source", move |_| async move {
            let mut inner = self.inner.write().await;
            if inner.failures.source_connects > 0 {
                inner.failures.source_connects -= 1;
                return Err(MigrateError::State("source refused connection".into()));
            }
            Ok(())
        })
        .await
        .map_err(|e| MigrateError::connection("source", self.policy.max_attempts, e.to_string()))?;

        Ok(Box::new(self.clone()))
    }

    async fn connect_target(&self, log: &RunLog) -> Result<Box<dyn TargetWriter>> {
        retry(&self.policy, log, "connect to target", move |_| async move {
            let mut inner = self.inner.write().await;
            if inner.failures.target_connects > 0 {
                inner.failures.target_connects -= 1;
                return Err(MigrateError::State("target refused connection".into()));
            }
            Ok(())
        })
        .await
        .map_err(|e| MigrateError::connection("target", self.policy.max_attempts, e.to_string()))?;

        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl SourceReader for MemoryDatabase {
    async fn count_rows(&self, table: &str) -> Result<i64> {
        let inner = self.inner.read().await;
        if inner.failures.extract.contains(table) {
            return Err(MigrateError::extract(table, "injected failure"));
        }
        inner
            .source
            .get(table)
            .map(|t| t.len() as i64)
            .ok_or_else(|| MigrateError::extract(table, "relation does not exist"))
    }

    async fn read_rows(&self, query: &ExtractQuery) -> Result<RowSet> {
        let mut inner = self.inner.write().await;
        let (sql, _) = query.to_sql()?;
        inner.queries.push(sql);

        if inner.failures.extract.contains(&query.table) {
            return Err(MigrateError::extract(&query.table, "injected failure"));
        }
        let table = inner
            .source
            .get(&query.table)
            .ok_or_else(|| MigrateError::extract(&query.table, "relation does not exist"))?;

        let mut rows: Vec<Vec<SqlValue>> = match &query.cursor {
            Some(cursor) => {
                let idx = table.column_index(&cursor.column).ok_or_else(|| {
                    MigrateError::extract(
                        &query.table,
                        format!("column \"{}\" does not exist", cursor.column),
                    )
                })?;
                table
                    .rows
                    .iter()
                    .filter(|r| r[idx].as_i64().is_some_and(|v| v > cursor.after))
                    .cloned()
                    .collect()
            }
            None => table.rows.clone(),
        };

        if let Some(limit) = query.filter.limit {
            if let Some(idx) = query.cursor.as_ref().and_then(|c| table.column_index(&c.column)) {
                rows.sort_by_key(|r| r[idx].as_i64());
            }
            rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(RowSet::new(table.columns.clone(), rows))
    }
}

#[async_trait]
impl TargetWriter for MemoryDatabase {
    async fn delete_all(&self, table: &str) -> Result<u64> {
        let mut inner = self.inner.write().await;
        if inner.failures.deletes.contains(table) {
            return Err(MigrateError::load(table, "injected delete failure"));
        }
        let removed = inner.target.get_mut(table).map(|t| {
            let n = t.rows.len() as u64;
            t.rows.clear();
            n
        });
        Ok(removed.unwrap_or(0))
    }

    async fn upsert_page(&self, plan: &UpsertPlan, rows: &[Vec<SqlValue>]) -> Result<u64> {
        let mut inner = self.inner.write().await;

        if let Some(remaining) = inner.failures.upserts.get_mut(&plan.target) {
            if *remaining == 0 {
                return Err(MigrateError::load(&plan.table, "injected upsert failure"));
            }
            *remaining -= 1;
        }

        let key_idx: Vec<usize> = plan
            .key
            .iter()
            .filter_map(|k| plan.columns.iter().position(|c| c == k))
            .collect();

        let table = inner
            .target
            .entry(plan.target.clone())
            .or_insert_with(|| RowSet::new(plan.columns.clone(), Vec::new()));

        let mut affected = 0;
        for row in rows {
            let existing = table
                .rows
                .iter()
                .position(|r| key_idx.iter().all(|&i| r.get(i) == row.get(i)));
            match (existing, plan.on_conflict) {
                (Some(pos), ConflictPolicy::Overwrite) => {
                    table.rows[pos] = row.clone();
                    affected += 1;
                }
                (Some(_), ConflictPolicy::Ignore) => {}
                (None, _) => {
                    table.rows.push(row.clone());
                    affected += 1;
                }
            }
        }
        debug!("memory upsert into {}: {} rows affected", plan.target, affected);
        Ok(affected)
    }

    async fn insert_audit(&self, table: &str, row: &AuditRow) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.failures.audit {
            return Err(MigrateError::State(format!(
                "relation \"{}\" does not exist",
                table
            )));
        }
        inner.audit.push((table.to_string(), row.clone()));
        Ok(())
    }
}
