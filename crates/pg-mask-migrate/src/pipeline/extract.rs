//! Extract stage: builds the source query for a table and reads its rows.

use crate::config::{RowFilter, TableSpec};
use crate::core::identifier::{quote_pg, quote_table};
use crate::core::traits::SourceReader;
use crate::core::value::{RowSet, SqlValue};
use crate::error::{MigrateError, Result};

/// `column > after`, the incremental predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorPredicate {
    pub column: String,
    pub after: i64,
}

/// Everything needed to read one table from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractQuery {
    pub table: String,
    pub filter: RowFilter,
    pub cursor: Option<CursorPredicate>,
}

impl ExtractQuery {
    /// Read every row matching the table's filter.
    pub fn full(spec: &TableSpec) -> Self {
        Self {
            table: spec.name.clone(),
            filter: spec.filter.clone().unwrap_or_default(),
            cursor: None,
        }
    }

    /// Read only rows whose cursor column is above `watermark`.
    pub fn incremental(spec: &TableSpec, watermark: i64) -> Self {
        Self {
            cursor: Some(CursorPredicate {
                column: spec.incremental_column.clone(),
                after: watermark,
            }),
            ..Self::full(spec)
        }
    }

    /// Render the statement and its parameters.
    ///
    /// The configured condition is wrapped in parentheses and AND-ed with the
    /// cursor predicate; the watermark is bound as `$1`. With both a cursor
    /// and a LIMIT, rows are ordered by the cursor so the limit takes the
    /// lowest unprocessed values first.
    pub fn to_sql(&self) -> Result<(String, Vec<SqlValue>)> {
        let mut sql = format!("SELECT * FROM {}", quote_table(&self.table)?);
        let mut params = Vec::new();
        let mut predicates = Vec::new();

        if let Some(condition) = &self.filter.condition {
            predicates.push(format!("({})", condition));
        }
        if let Some(cursor) = &self.cursor {
            let value = SqlValue::I64(cursor.after);
            predicates.push(format!(
                "{} > {}",
                quote_pg(&cursor.column)?,
                value.placeholder(params.len() + 1)
            ));
            params.push(value);
        }

        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        if let Some(limit) = self.filter.limit {
            if let Some(cursor) = &self.cursor {
                sql.push_str(&format!(" ORDER BY {}", quote_pg(&cursor.column)?));
            }
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok((sql, params))
    }
}

/// Run the extract query, tagging any failure with the table name.
pub async fn extract(reader: &dyn SourceReader, query: &ExtractQuery) -> Result<RowSet> {
    reader
        .read_rows(query)
        .await
        .map_err(|e| MigrateError::extract(&query.table, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec(filter: Option<RowFilter>) -> TableSpec {
        TableSpec {
            name: "customers".into(),
            columns: BTreeMap::new(),
            filter,
            incremental_column: "id".into(),
            load: None,
        }
    }

    #[test]
    fn test_full_without_filter() {
        let (sql, params) = ExtractQuery::full(&spec(None)).to_sql().unwrap();
        assert_eq!(sql, "SELECT * FROM \"customers\"");
        assert!(params.is_empty());
    }

    #[test]
    fn test_full_keeps_filter() {
        let q = ExtractQuery::full(&spec(Some(RowFilter::parse("WHERE active = true LIMIT 5"))));
        let (sql, _) = q.to_sql().unwrap();
        assert_eq!(sql, "SELECT * FROM \"customers\" WHERE (active = true) LIMIT 5");
    }

    #[test]
    fn test_incremental_without_filter_adds_where() {
        let (sql, params) = ExtractQuery::incremental(&spec(None), 99).to_sql().unwrap();
        assert_eq!(sql, "SELECT * FROM \"customers\" WHERE \"id\" > $1::text::bigint");
        assert_eq!(params, vec![SqlValue::I64(99)]);
    }

    #[test]
    fn test_incremental_with_condition_is_and_combined() {
        let q = ExtractQuery::incremental(&spec(Some(RowFilter::parse("WHERE a = 1 OR b = 2"))), 7);
        let (sql, _) = q.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"customers\" WHERE (a = 1 OR b = 2) AND \"id\" > $1::text::bigint"
        );
    }

    #[test]
    fn test_incremental_with_limit_only_puts_cursor_before_limit() {
        let q = ExtractQuery::incremental(&spec(Some(RowFilter::parse("LIMIT 10"))), 0);
        let (sql, _) = q.to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM \"customers\" WHERE \"id\" > $1::text::bigint ORDER BY \"id\" LIMIT 10"
        );
    }

    #[test]
    fn test_custom_cursor_column_is_quoted() {
        let mut s = spec(None);
        s.incremental_column = "order_no".into();
        let (sql, _) = ExtractQuery::incremental(&s, 3).to_sql().unwrap();
        assert!(sql.contains("\"order_no\" > $1"));
    }
}
