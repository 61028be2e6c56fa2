//! Load stage: shapes masked rows for the target and upserts them page by page.

use crate::config::{ConflictPolicy, LoadDescriptor};
use crate::core::identifier::{quote_columns, quote_pg, quote_table};
use crate::core::traits::TargetWriter;
use crate::core::value::{RowSet, SqlNullType, SqlValue};
use crate::error::{MigrateError, Result};
use crate::logging::RunLog;

/// Bind parameters PostgreSQL accepts in one statement.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Resolved upsert for one table: target, column order, key and policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertPlan {
    /// Source table name, used in messages.
    pub table: String,
    pub target: String,
    /// Target columns in insert order, batch tag last.
    pub columns: Vec<String>,
    pub key: Vec<String>,
    pub on_conflict: ConflictPolicy,
}

impl UpsertPlan {
    pub fn new(table: &str, load: &LoadDescriptor) -> Self {
        Self {
            table: table.to_string(),
            target: load.target.clone(),
            columns: load.target_columns(),
            key: load.key.clone(),
            on_conflict: load.on_conflict,
        }
    }

    /// Non-key columns, the ones overwritten on conflict.
    pub fn update_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !self.key.contains(c))
            .map(String::as_str)
            .collect()
    }

    /// Rows per upsert statement: `batch_size`, lowered so that one page never
    /// binds more than [`MAX_BIND_PARAMS`] parameters.
    pub fn page_size(&self, batch_size: usize) -> usize {
        let per_row = self.columns.len().max(1);
        batch_size.min(MAX_BIND_PARAMS / per_row).max(1)
    }

    /// Multi-row `INSERT ... ON CONFLICT` for `rows`.
    ///
    /// Each column is cast to the type of its first non-NULL value in the page.
    pub fn to_sql(&self, rows: &[Vec<SqlValue>]) -> Result<String> {
        let casts: Vec<SqlNullType> = (0..self.columns.len())
            .map(|i| {
                rows.iter()
                    .filter_map(|r| r.get(i))
                    .find(|v| !v.is_null())
                    .or_else(|| rows.first().and_then(|r| r.get(i)))
                    .map_or(SqlNullType::String, SqlValue::null_type)
            })
            .collect();

        let mut idx = 0;
        let values: Vec<String> = rows
            .iter()
            .map(|row| {
                let placeholders: Vec<String> = (0..row.len())
                    .map(|i| {
                        idx += 1;
                        let cast = casts.get(i).cloned().unwrap_or(SqlNullType::String);
                        SqlValue::Null(cast).placeholder(idx)
                    })
                    .collect();
                format!("({})", placeholders.join(", "))
            })
            .collect();

        let update_cols = self.update_columns();
        let action = if self.on_conflict == ConflictPolicy::Ignore || update_cols.is_empty() {
            "DO NOTHING".to_string()
        } else {
            let sets = update_cols
                .iter()
                .map(|c| {
                    let q = quote_pg(c)?;
                    Ok(format!("{} = EXCLUDED.{}", q, q))
                })
                .collect::<Result<Vec<_>>>()?;
            format!("DO UPDATE SET {}", sets.join(", "))
        };

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) {}",
            quote_table(&self.target)?,
            quote_columns(&self.columns)?,
            values.join(", "),
            quote_columns(&self.key)?,
            action
        ))
    }
}

/// Project masked rows onto the descriptor's columns and append the batch tag.
pub fn shape_rows(
    table: &str,
    masked: &RowSet,
    load: &LoadDescriptor,
    execution_id: &str,
) -> Result<Vec<Vec<SqlValue>>> {
    let indexes = load
        .columns
        .iter()
        .map(|m| {
            masked.column_index(m.source()).ok_or_else(|| {
                MigrateError::load(
                    table,
                    format!("column '{}' is missing from the extracted rows", m.source()),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(masked
        .rows
        .iter()
        .map(|row| {
            let mut out: Vec<SqlValue> = indexes.iter().map(|&i| row[i].clone()).collect();
            if load.batch_tag_column.is_some() {
                out.push(SqlValue::Text(execution_id.to_string()));
            }
            out
        })
        .collect())
}

/// Result of loading one table.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Rows in pages that committed.
    pub written: u64,
    /// The failure that stopped the load, if any.
    pub error: Option<MigrateError>,
}

/// Upsert `rows` in pages of `batch_size`, capped by [`UpsertPlan::page_size`].
///
/// Stops at the first failing page. Pages committed before it still count
/// as written; later pages are not attempted.
pub async fn load(
    writer: &dyn TargetWriter,
    plan: &UpsertPlan,
    rows: &[Vec<SqlValue>],
    batch_size: usize,
    log: &RunLog,
) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();
    let page_size = plan.page_size(batch_size);
    if page_size < batch_size {
        tracing::debug!(
            "{}: {} columns per row, pages capped at {} rows",
            plan.target,
            plan.columns.len(),
            page_size
        );
    }
    let pages = rows.chunks(page_size);
    let total_pages = pages.len();

    for (n, page) in pages.enumerate() {
        match writer.upsert_page(plan, page).await {
            Ok(_) => {
                outcome.written += page.len() as u64;
                tracing::debug!(
                    "{}: page {}/{} committed ({} rows)",
                    plan.target,
                    n + 1,
                    total_pages,
                    page.len()
                );
            }
            Err(e) => {
                log.error(format!(
                    "   Batch {}/{} into {} failed: {}",
                    n + 1,
                    total_pages,
                    plan.target,
                    e
                ));
                outcome.error = Some(match e {
                    MigrateError::Load { .. } => e,
                    other => MigrateError::load(&plan.table, other.to_string()),
                });
                break;
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMapping;

    fn descriptor(policy: ConflictPolicy) -> LoadDescriptor {
        LoadDescriptor {
            target: "customers_qa".into(),
            key: vec!["id".into()],
            on_conflict: policy,
            columns: vec![
                ColumnMapping::Same("id".into()),
                ColumnMapping::Renamed {
                    source: "nombre".into(),
                    target: "full_name".into(),
                },
            ],
            batch_tag_column: Some("etl_batch_id".into()),
        }
    }

    fn page() -> Vec<Vec<SqlValue>> {
        vec![
            vec![SqlValue::I64(1), "Ana".into(), "run-1".into()],
            vec![SqlValue::I64(2), SqlValue::Null(SqlNullType::String), "run-1".into()],
        ]
    }

    #[test]
    fn test_overwrite_sql_updates_non_key_columns_and_tag() {
        let plan = UpsertPlan::new("customers", &descriptor(ConflictPolicy::Overwrite));
        let sql = plan.to_sql(&page()).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO \"customers_qa\" (\"id\", \"full_name\", \"etl_batch_id\") VALUES \
             ($1::text::bigint, $2::text, $3::text), ($4::text::bigint, $5::text, $6::text) \
             ON CONFLICT (\"id\") DO UPDATE SET \"full_name\" = EXCLUDED.\"full_name\", \
             \"etl_batch_id\" = EXCLUDED.\"etl_batch_id\""
        );
    }

    #[test]
    fn test_ignore_sql_does_nothing_on_conflict() {
        let plan = UpsertPlan::new("customers", &descriptor(ConflictPolicy::Ignore));
        let sql = plan.to_sql(&page()).unwrap();
        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_null_column_takes_type_from_later_row() {
        let plan = UpsertPlan::new("customers", &descriptor(ConflictPolicy::Ignore));
        let rows = vec![
            vec![SqlValue::Null(SqlNullType::String), "a".into(), "r".into()],
            vec![SqlValue::I32(2), "b".into(), "r".into()],
        ];
        let sql = plan.to_sql(&rows).unwrap();
        assert!(sql.contains("($1::text::integer, $2::text, $3::text)"));
    }

    #[test]
    fn test_sql_casts_back_to_source_types() {
        let plan = UpsertPlan::new("customers", &descriptor(ConflictPolicy::Overwrite));
        let rows = vec![vec![
            SqlValue::Raw {
                text: "{\"tier\": \"gold\"}".into(),
                pg_type: "jsonb".into(),
            },
            SqlValue::Null(SqlNullType::Other("\"public\".\"mood\"".into())),
            "run-1".into(),
        ]];
        let sql = plan.to_sql(&rows).unwrap();
        assert!(sql.contains("($1::text::jsonb, $2::text::\"public\".\"mood\", $3::text)"));
    }

    #[test]
    fn test_page_size_respects_bind_limit() {
        let plan = UpsertPlan::new("customers", &descriptor(ConflictPolicy::Overwrite));
        assert_eq!(plan.page_size(1000), 1000);
        assert_eq!(plan.page_size(100_000), MAX_BIND_PARAMS / 3);
        assert_eq!(plan.page_size(0), 1);

        let mut wide = plan.clone();
        wide.columns = (0..8).map(|i| format!("c{}", i)).collect();
        assert_eq!(wide.page_size(10_000), 8191);
        assert!(wide.page_size(10_000) * wide.columns.len() <= MAX_BIND_PARAMS);
    }

    #[test]
    fn test_shape_rows_maps_and_tags() {
        let masked = RowSet::new(
            vec!["nombre".into(), "id".into(), "extra".into()],
            vec![vec!["Ana".into(), SqlValue::I64(1), "x".into()]],
        );
        let rows = shape_rows("customers", &masked, &descriptor(ConflictPolicy::Overwrite), "run-9")
            .unwrap();
        assert_eq!(
            rows,
            vec![vec![SqlValue::I64(1), "Ana".into(), "run-9".into()]]
        );
    }

    #[test]
    fn test_shape_rows_missing_column_is_load_error() {
        let masked = RowSet::new(vec!["id".into()], vec![vec![SqlValue::I64(1)]]);
        let err = shape_rows("customers", &masked, &descriptor(ConflictPolicy::Overwrite), "r")
            .unwrap_err();
        assert!(matches!(err, MigrateError::Load { .. }));
        assert!(err.to_string().contains("nombre"));
    }
}
