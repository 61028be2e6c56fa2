//! Run orchestrator: role gate, connections, cleanup and the per-table pipeline.

use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::audit::{finalize, ExecutionRecord, HistoryLog, Outcome, TableStats};
use crate::config::{Config, TableSpec};
use crate::core::traits::{Connector, SourceReader, TargetWriter};
use crate::drivers::PgConnector;
use crate::error::{MigrateError, Result};
use crate::logging::RunLog;
use crate::masking::{MaskingEngine, MaskingRule};
use crate::pipeline::{extract, load, shape_rows, transform, ExtractQuery, UpsertPlan};
use crate::rbac::{authorize, Operation, Role};
use crate::state::WatermarkState;

/// Coordinates one invocation from role check to audit.
pub struct Orchestrator {
    config: Config,
    connector: Arc<dyn Connector>,
    engine: MaskingEngine,
}

/// Row count reported by a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a run returns to its caller.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub role: String,
    pub operation: Option<Operation>,
    /// Finished execution record; `None` for dry runs and aborted runs.
    pub record: Option<ExecutionRecord>,
    /// Per-table counts, dry runs only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub counts: Vec<TableCount>,
    /// Error that stopped the run early.
    #[serde(serialize_with = "serialize_error")]
    pub fatal: Option<MigrateError>,
    /// Every log line of the run, newline-joined.
    pub transcript: String,
}

fn serialize_error<S: Serializer>(error: &Option<MigrateError>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

impl RunReport {
    /// Process exit code: the fatal error's code, 1 for a partial run, else 0.
    pub fn exit_code(&self) -> u8 {
        if let Some(e) = &self.fatal {
            return e.exit_code();
        }
        match self.record.as_ref().map(|r| r.outcome) {
            Some(Outcome::Partial) => 1,
            Some(Outcome::Blocked) => 3,
            _ => 0,
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.record.as_ref().map(|r| r.outcome)
    }
}

impl Orchestrator {
    pub fn new(config: Config, connector: Arc<dyn Connector>) -> Self {
        let engine = MaskingEngine::from_config(&config.masking);
        Self {
            config,
            connector,
            engine,
        }
    }

    /// Orchestrator over the configured PostgreSQL servers.
    pub fn with_postgres(config: Config) -> Result<Self> {
        let connector = PgConnector::new(&config)?;
        Ok(Self::new(config, Arc::new(connector)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `option` (`1` full, `2` incremental, `3` dry-run) as `role`.
    ///
    /// Never panics on run failures: fatal errors are returned in
    /// [`RunReport::fatal`], per-table errors in the execution record, and
    /// everything is in the transcript.
    pub async fn execute(&self, role: &str, option: &str) -> RunReport {
        let log = RunLog::new();
        let role_name = role.trim().to_lowercase();
        let mut report = RunReport {
            role: role_name.clone(),
            operation: None,
            record: None,
            counts: Vec::new(),
            fatal: None,
            transcript: String::new(),
        };

        let operation = match Operation::from_option(option) {
            Ok(op) => op,
            Err(e) => {
                log.error(e.to_string());
                report.fatal = Some(e);
                report.transcript = log.transcript();
                return report;
            }
        };
        report.operation = Some(operation);

        let history = HistoryLog::new(&self.config.migration.history_file);
        let mut record = ExecutionRecord::start(&role_name, operation.as_str());
        log.info(format!("Starting execution {}", record.execution_id));
        log.info(format!("Role: {} / mode: {}", role_name, operation));

        if let Err(e) = role.parse::<Role>().and_then(|r| authorize(r, operation)) {
            log.error(format!("ACCESS DENIED: {}", e));
            log.error("The attempt has been recorded in the execution history.");
            record.block(e.to_string());
            finalize(&record, &history, None, &log).await;
            report.record = Some(record);
            report.fatal = Some(e);
            report.transcript = log.transcript();
            return report;
        }

        match self.run(operation, &mut record, &history, &log).await {
            Ok(Some(counts)) => report.counts = counts,
            Ok(None) => report.record = Some(record),
            Err(e) => {
                log.error(format!("Critical error, run aborted: {}", e));
                report.fatal = Some(e);
            }
        }
        report.transcript = log.transcript();
        report
    }

    /// Connect and run an authorized operation. Dry runs return their counts.
    async fn run(
        &self,
        operation: Operation,
        record: &mut ExecutionRecord,
        history: &HistoryLog,
        log: &RunLog,
    ) -> Result<Option<Vec<TableCount>>> {
        let state_file = &self.config.migration.state_file;
        let mut state = match WatermarkState::load(state_file) {
            Ok(state) => state,
            Err(e) => {
                log.warn(format!("{}; starting from empty watermarks", e));
                WatermarkState::new()
            }
        };

        log.info("Connecting to source and target...");
        let source = self.connector.connect_source(log).await?;
        let target = self.connector.connect_target(log).await?;

        if operation == Operation::DryRun {
            let counts = self.dry_run(source.as_ref(), log).await;
            // dropping a client ends its connection
            drop(source);
            drop(target);
            log.info("Dry run finished. No data was modified.");
            return Ok(Some(counts));
        }

        if operation == Operation::FullLoad {
            self.cleanup(target.as_ref(), &mut state, log).await;
        }

        for spec in &self.config.tables {
            let stats = self
                .process_table(
                    spec,
                    operation,
                    source.as_ref(),
                    target.as_ref(),
                    &mut state,
                    &record.execution_id,
                    log,
                )
                .await;
            record.tables.push(stats);
        }

        record.finish();
        finalize(
            record,
            history,
            Some((target.as_ref(), self.config.migration.audit_table.as_str())),
            log,
        )
        .await;

        drop(source);
        drop(target);

        match record.outcome {
            Outcome::Success => log.info(format!(
                "Run finished: {} rows written across {} tables",
                record.total_rows,
                record.tables.len()
            )),
            _ => log.warn(format!(
                "Run finished with errors: {} rows written; see per-table errors",
                record.total_rows
            )),
        }
        Ok(None)
    }

    async fn dry_run(&self, source: &dyn SourceReader, log: &RunLog) -> Vec<TableCount> {
        log.info("DRY RUN: validating connections and counting rows");
        let mut counts = Vec::with_capacity(self.config.tables.len());
        for spec in &self.config.tables {
            match source.count_rows(&spec.name).await {
                Ok(n) => {
                    log.info(format!("   Table '{}': connection OK, {} rows available", spec.name, n));
                    counts.push(TableCount {
                        table: spec.name.clone(),
                        rows: Some(n),
                        error: None,
                    });
                }
                Err(e) => {
                    log.error(format!("   Could not validate table '{}': {}", spec.name, e));
                    counts.push(TableCount {
                        table: spec.name.clone(),
                        rows: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        counts
    }

    /// Empty every loaded target table, children first, and reset watermarks.
    async fn cleanup(&self, target: &dyn TargetWriter, state: &mut WatermarkState, log: &RunLog) {
        log.info("FULL LOAD: cleaning target tables in reverse order");
        for spec in self.config.tables.iter().rev() {
            let Some(load_desc) = &spec.load else {
                continue;
            };
            log.info(format!("   Cleaning table {}", load_desc.target));
            match target.delete_all(&load_desc.target).await {
                Ok(n) => {
                    tracing::debug!("{}: {} rows deleted", load_desc.target, n);
                    state.reset(&spec.name);
                }
                Err(e) => log.warn(format!("   Could not clean {}: {}", load_desc.target, e)),
            }
        }
        if let Err(e) = state.save(&self.config.migration.state_file) {
            log.error(format!("Could not persist reset watermarks: {}", e));
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_table(
        &self,
        spec: &TableSpec,
        operation: Operation,
        source: &dyn SourceReader,
        target: &dyn TargetWriter,
        state: &mut WatermarkState,
        execution_id: &str,
        log: &RunLog,
    ) -> TableStats {
        let mut stats = TableStats::new(&spec.name, spec.rules_applied());
        log.info(format!("Processing table {}", spec.name.to_uppercase()));

        let Some(load_desc) = &spec.load else {
            log.warn(format!(
                "   No load descriptor for {}; table skipped",
                spec.name
            ));
            return stats;
        };
        for (column, rule) in &spec.columns {
            if let MaskingRule::Unknown(name) = rule {
                log.warn(format!(
                    "   Unknown masking rule '{}' on column {}; values copied unchanged",
                    name, column
                ));
            }
        }

        let watermark = state.get(&spec.name);
        let query = if operation == Operation::IncrementalLoad {
            log.info(format!(
                "   Incremental mode: reading rows with {} > {}",
                spec.incremental_column, watermark
            ));
            ExtractQuery::incremental(spec, watermark)
        } else {
            ExtractQuery::full(spec)
        };

        let rows = match extract(source, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                log.error(format!("   {}", e));
                stats.errors.push(e.to_string());
                return stats;
            }
        };
        stats.rows_read = rows.len() as u64;
        log.info(format!("   -> {} rows found", rows.len()));

        let transformed = transform(rows, spec, &self.engine, watermark);
        let shaped = match shape_rows(&spec.name, &transformed.rows, load_desc, execution_id) {
            Ok(shaped) => shaped,
            Err(e) => {
                log.error(format!("   {}", e));
                stats.errors.push(e.to_string());
                return stats;
            }
        };

        let plan = UpsertPlan::new(&spec.name, load_desc);
        log.info(format!(
            "   -> Loading {} rows into {} (batches of {})",
            shaped.len(),
            plan.target,
            self.config.migration.batch_size
        ));
        let outcome = load(target, &plan, &shaped, self.config.migration.batch_size, log).await;
        stats.rows_written = outcome.written;
        if let Some(e) = outcome.error {
            stats.errors.push(e.to_string());
            return stats;
        }

        if stats.rows_read > 0 {
            let new_watermark = state.advance(&spec.name, transformed.watermark);
            match state.save(&self.config.migration.state_file) {
                Ok(()) => log.info(format!("   State updated: {} -> {}", spec.name, new_watermark)),
                Err(e) => {
                    log.error(format!("   Could not persist watermark: {}", e));
                    stats.errors.push(e.to_string());
                }
            }
        }
        stats
    }
}
