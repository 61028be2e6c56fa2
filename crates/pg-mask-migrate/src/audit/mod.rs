//! Execution records, the local history file and the target audit table.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::traits::TargetWriter;
use crate::error::{MigrateError, Result};
use crate::logging::RunLog;
use crate::state::write_atomic;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every table processed without error.
    Success,
    /// At least one table recorded an error.
    Partial,
    /// The role was not allowed to run the requested mode.
    Blocked,
}

/// Per-table counters for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    pub table: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rules_applied: Vec<String>,
    pub errors: Vec<String>,
}

impl TableStats {
    pub fn new(table: impl Into<String>, rules_applied: Vec<String>) -> Self {
        Self {
            table: table.into(),
            rows_read: 0,
            rows_written: 0,
            rules_applied,
            errors: Vec::new(),
        }
    }
}

/// One run, from gate to finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub role: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_rows: u64,
    pub tables: Vec<TableStats>,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_error: Option<String>,
}

impl ExecutionRecord {
    /// Open a record with a fresh execution id.
    pub fn start(role: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            role: role.into(),
            mode: mode.into(),
            started_at: Utc::now(),
            finished_at: None,
            total_rows: 0,
            tables: Vec::new(),
            outcome: Outcome::Success,
            security_error: None,
        }
    }

    /// Close the record: total rows written and outcome from table errors.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.total_rows = self.tables.iter().map(|t| t.rows_written).sum();
        self.outcome = if self.tables.iter().any(|t| !t.errors.is_empty()) {
            Outcome::Partial
        } else {
            Outcome::Success
        };
    }

    /// Close the record as blocked by the role gate.
    pub fn block(&mut self, reason: impl Into<String>) {
        self.finished_at = Some(Utc::now());
        self.outcome = Outcome::Blocked;
        self.security_error = Some(reason.into());
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.table.as_str()).collect()
    }
}

/// Row inserted into the target audit table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRow {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Comma-joined table names.
    pub tables_processed: String,
    pub total_rows: i64,
    /// Per-table stats as JSON.
    pub detail_json: String,
}

impl AuditRow {
    pub const COLUMNS: [&'static str; 6] = [
        "execution_id",
        "started_at",
        "finished_at",
        "tables_processed",
        "total_rows",
        "detail_json",
    ];

    pub fn from_record(record: &ExecutionRecord) -> Result<Self> {
        Ok(Self {
            execution_id: record.execution_id.clone(),
            started_at: record.started_at,
            finished_at: record.finished_at.unwrap_or_else(Utc::now),
            tables_processed: record.table_names().join(", "),
            total_rows: i64::try_from(record.total_rows).unwrap_or(i64::MAX),
            detail_json: serde_json::to_string(&record.tables)?,
        })
    }
}

/// Append-only local history: a JSON array of execution records.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry in the file. Missing or unreadable files yield an empty list.
    pub fn entries(&self) -> Vec<serde_json::Value> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// Entries that parse as execution records.
    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.entries()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    /// Append one record, rewriting the whole file.
    pub fn append(&self, record: &ExecutionRecord) -> Result<()> {
        let mut entries = self.entries();
        entries.push(serde_json::to_value(record)?);
        let content = serde_json::to_string_pretty(&entries)?;
        write_atomic(&self.path, &content)
            .map_err(|e| MigrateError::State(format!("{}: {}", self.path.display(), e)))
    }
}

/// Persist a finished record locally and, when a target is given, to the audit table.
///
/// Neither failure aborts the run; both are logged.
pub async fn finalize(
    record: &ExecutionRecord,
    history: &HistoryLog,
    target: Option<(&dyn TargetWriter, &str)>,
    log: &RunLog,
) {
    match history.append(record) {
        Ok(()) => log.info(format!("Execution history saved to {}", history.path().display())),
        Err(e) => log.error(format!("Could not write execution history: {}", e)),
    }

    let Some((writer, audit_table)) = target else {
        return;
    };
    let result = match AuditRow::from_record(record) {
        Ok(row) => writer.insert_audit(audit_table, &row).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => log.info(format!("Audit row written to {}", audit_table)),
        Err(e) => log.warn(MigrateError::AuditWrite(format!("{}: {}", audit_table, e)).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record_with(stats: Vec<TableStats>) -> ExecutionRecord {
        let mut record = ExecutionRecord::start("dev", "full-load");
        record.tables = stats;
        record.finish();
        record
    }

    #[test]
    fn test_finish_sums_written_rows() {
        let mut a = TableStats::new("customers", vec![]);
        a.rows_read = 10;
        a.rows_written = 8;
        let mut b = TableStats::new("orders", vec![]);
        b.rows_written = 5;
        let record = record_with(vec![a, b]);
        assert_eq!(record.total_rows, 13);
        assert_eq!(record.outcome, Outcome::Success);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_any_table_error_makes_partial() {
        let mut b = TableStats::new("orders", vec![]);
        b.errors.push("duplicate key".into());
        let record = record_with(vec![TableStats::new("customers", vec![]), b]);
        assert_eq!(record.outcome, Outcome::Partial);
    }

    #[test]
    fn test_block_sets_security_error() {
        let mut record = ExecutionRecord::start("operator", "full-load");
        record.block("full-load denied");
        assert_eq!(record.outcome, Outcome::Blocked);
        assert_eq!(record.security_error.as_deref(), Some("full-load denied"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["outcome"], "blocked");
    }

    #[test]
    fn test_audit_row_from_record() {
        let mut stats = TableStats::new("customers", vec!["email".into()]);
        stats.rows_written = 3;
        let record = record_with(vec![stats, TableStats::new("orders", vec![])]);

        let row = AuditRow::from_record(&record).unwrap();
        assert_eq!(row.execution_id, record.execution_id);
        assert_eq!(row.tables_processed, "customers, orders");
        assert_eq!(row.total_rows, 3);
        let detail: Vec<TableStats> = serde_json::from_str(&row.detail_json).unwrap();
        assert_eq!(detail, record.tables);
    }

    #[test]
    fn test_history_appends() {
        let dir = TempDir::new().unwrap();
        let history = HistoryLog::new(dir.path().join("history.json"));
        assert!(history.records().is_empty());

        history.append(&record_with(vec![])).unwrap();
        history.append(&record_with(vec![])).unwrap();
        assert_eq!(history.records().len(), 2);
    }

    #[test]
    fn test_unreadable_history_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ broken").unwrap();

        let history = HistoryLog::new(&path);
        history.append(&record_with(vec![])).unwrap();
        assert_eq!(history.records().len(), 1);
    }

    #[test]
    fn test_foreign_entries_are_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"[{"legacy": true}]"#).unwrap();

        let history = HistoryLog::new(&path);
        history.append(&record_with(vec![])).unwrap();
        assert_eq!(history.entries().len(), 2);
        assert_eq!(history.records().len(), 1);
    }
}
