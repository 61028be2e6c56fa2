//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::common::RetryPolicy;
use crate::masking::MaskingRule;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source and target connection settings.
    pub database: DatabaseConfig,

    /// Run behavior: batching, retries, state and history files.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Masking rule parameters.
    #[serde(default)]
    pub masking: MaskingConfig,

    /// Tables to migrate, in processing order (parents before children).
    pub tables: Vec<TableSpec>,
}

impl Config {
    /// Make relative state/history paths relative to `base` (the config file's directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.migration.state_file.is_relative() {
            self.migration.state_file = base.join(&self.migration.state_file);
        }
        if self.migration.history_file.is_relative() {
            self.migration.history_file = base.join(&self.migration.history_file);
        }
        self
    }

    /// Look up a table spec by source table name.
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Source and target database connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Source connection string (`postgres://` URL or key=value form).
    pub source_url: String,

    /// Target connection string.
    pub target_url: String,

    /// TLS mode for both connections (default: "require").
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("source_url", &"[REDACTED]")
            .field("target_url", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per batched upsert statement (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Retry policy for connections and statements.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Watermark file (default: state.json).
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Local execution history file (default: execution_history.json).
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Target table receiving one audit row per run (default: audit_logs).
    #[serde(default = "default_audit_table")]
    pub audit_table: String,

    /// Reject unknown masking rules and tables without a load descriptor.
    #[serde(default)]
    pub strict: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            retry: RetryConfig::default(),
            state_file: default_state_file(),
            history_file: default_history_file(),
            audit_table: default_audit_table(),
            strict: false,
        }
    }
}

/// Fixed-delay retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before giving up, including the first (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds (default: 1000).
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

/// Masking rule parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// Salt appended to values before hashing.
    #[serde(default = "default_salt")]
    pub salt: String,

    /// Domain of generated email addresses.
    #[serde(default = "default_email_domain")]
    pub email_domain: String,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
            email_domain: default_email_domain(),
        }
    }
}

/// One source table to migrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    /// Source table name (optionally schema-qualified).
    pub name: String,

    /// Column name -> masking rule.
    #[serde(default)]
    pub columns: BTreeMap<String, MaskingRule>,

    /// Optional row filter applied to every extract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<RowFilter>,

    /// Integer cursor column for incremental loads (default: "id").
    #[serde(default = "default_incremental_column")]
    pub incremental_column: String,

    /// How masked rows are written to the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load: Option<LoadDescriptor>,
}

impl TableSpec {
    /// Names of the masking rules configured for this table, by column.
    pub fn rules_applied(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }
}

/// Row filter: an optional WHERE condition and an optional LIMIT.
///
/// Accepts either a mapping (`{condition: "...", limit: 100}`) or a raw SQL
/// fragment such as `"WHERE active = true LIMIT 100"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RowFilterRepr")]
pub struct RowFilter {
    /// Body of the WHERE clause, without the keyword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Maximum number of rows to read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RowFilterRepr {
    Fragment(String),
    Structured {
        #[serde(default)]
        condition: Option<String>,
        #[serde(default)]
        limit: Option<u64>,
    },
}

impl From<RowFilterRepr> for RowFilter {
    fn from(repr: RowFilterRepr) -> Self {
        match repr {
            RowFilterRepr::Fragment(fragment) => RowFilter::parse(&fragment),
            RowFilterRepr::Structured { condition, limit } => RowFilter {
                condition: condition.filter(|c| !c.trim().is_empty()),
                limit,
            },
        }
    }
}

impl RowFilter {
    /// Split a raw `WHERE ... LIMIT n` fragment into its parts.
    ///
    /// Keywords are matched case-insensitively. A LIMIT that is not a plain
    /// integer is kept as part of the condition text, where validation will
    /// report it. So are ORDER BY, GROUP BY, OFFSET and the other clauses that
    /// cannot follow a row filter.
    pub fn parse(fragment: &str) -> Self {
        let trimmed = fragment.trim();
        let upper = trimmed.to_ascii_uppercase();

        let (body, limit) = match find_keyword(&upper, "LIMIT") {
            Some(pos) => {
                let tail = trimmed[pos + "LIMIT".len()..].trim();
                match tail.parse::<u64>() {
                    Ok(n) => (trimmed[..pos].trim(), Some(n)),
                    Err(_) => (trimmed, None),
                }
            }
            None => (trimmed, None),
        };

        let body_upper = body.to_ascii_uppercase();
        let condition = match find_keyword(&body_upper, "WHERE") {
            Some(pos) => body[pos + "WHERE".len()..].trim(),
            None => body,
        };

        RowFilter {
            condition: (!condition.is_empty()).then(|| condition.to_string()),
            limit,
        }
    }
}

/// Position of `keyword` as a standalone word in an uppercased string.
fn find_keyword(upper: &str, keyword: &str) -> Option<usize> {
    upper.match_indices(keyword).map(|(i, _)| i).find(|&i| {
        let before_ok = upper[..i]
            .chars()
            .last()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_');
        let after_ok = upper[i + keyword.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_');
        before_ok && after_ok
    })
}

/// Declarative description of how a table is written to the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadDescriptor {
    /// Target table name.
    pub target: String,

    /// Conflict key columns (target names).
    pub key: Vec<String>,

    /// What to do when a key already exists.
    #[serde(default)]
    pub on_conflict: ConflictPolicy,

    /// Columns to write, in order.
    pub columns: Vec<ColumnMapping>,

    /// Optional column that receives the execution id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_tag_column: Option<String>,
}

impl LoadDescriptor {
    /// Target column names in insert order, including the batch tag.
    pub fn target_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = self.columns.iter().map(|c| c.target().to_string()).collect();
        if let Some(tag) = &self.batch_tag_column {
            cols.push(tag.clone());
        }
        cols
    }
}

/// Conflict policy for the batched upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Overwrite every non-key column on conflict.
    #[default]
    Overwrite,

    /// Keep the existing row on conflict.
    Ignore,
}

/// A written column: either the same name on both sides or an explicit mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnMapping {
    Same(String),
    Renamed { source: String, target: String },
}

impl ColumnMapping {
    pub fn source(&self) -> &str {
        match self {
            ColumnMapping::Same(name) => name,
            ColumnMapping::Renamed { source, .. } => source,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            ColumnMapping::Same(name) => name,
            ColumnMapping::Renamed { target, .. } => target,
        }
    }
}

// Default value functions for serde
fn default_ssl_mode() -> String {
    "require".to_string()
}

fn default_batch_size() -> usize {
    1_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    1_000
}

fn default_state_file() -> PathBuf {
    PathBuf::from("state.json")
}

fn default_history_file() -> PathBuf {
    PathBuf::from("execution_history.json")
}

fn default_audit_table() -> String {
    "audit_logs".to_string()
}

fn default_salt() -> String {
    "pg-mask-migrate".to_string()
}

fn default_email_domain() -> String {
    "example.com".to_string()
}

fn default_incremental_column() -> String {
    "id".to_string()
}
