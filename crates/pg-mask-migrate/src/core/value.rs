//! SQL value types for moving rows between source and target.
//!
//! Values are owned: rows are read once, masked in place and written once, so
//! there is no source buffer worth borrowing from.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tokio_postgres::types::{FromSql, Type};
use uuid::Uuid;

use crate::error::Result;

/// Type hint for NULL values so the target receives a correctly typed NULL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
    /// Any other PostgreSQL type, by its SQL name (`numeric`, `jsonb`, `"public"."mood"`).
    Other(String),
}

impl SqlNullType {
    /// PostgreSQL type name used in parameter casts.
    pub fn pg_type(&self) -> &str {
        match self {
            SqlNullType::Bool => "boolean",
            SqlNullType::I16 => "smallint",
            SqlNullType::I32 => "integer",
            SqlNullType::I64 => "bigint",
            SqlNullType::F32 => "real",
            SqlNullType::F64 => "double precision",
            SqlNullType::String => "text",
            SqlNullType::Bytes => "bytea",
            SqlNullType::Uuid => "uuid",
            SqlNullType::DateTime => "timestamp",
            SqlNullType::DateTimeOffset => "timestamptz",
            SqlNullType::Date => "date",
            SqlNullType::Time => "time",
            SqlNullType::Other(name) => name,
        }
    }
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint.
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Value read through its text form, with the source type to cast it back to.
    Raw { text: String, pg_type: String },
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value (for type-aware NULL encoding).
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => t.clone(),
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::Text(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
            SqlValue::Raw { pg_type, .. } => SqlNullType::Other(pg_type.clone()),
        }
    }

    /// Integer view of the value. Only integer columns qualify as cursors.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Text rendering of the value, `None` for NULL.
    ///
    /// This is the form sent as a query parameter; the statement casts it back
    /// to [`SqlNullType::pg_type`].
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null(_) => return None,
            SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
            SqlValue::I16(n) => n.to_string(),
            SqlValue::I32(n) => n.to_string(),
            SqlValue::I64(n) => n.to_string(),
            SqlValue::F32(n) => n.to_string(),
            SqlValue::F64(n) => n.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Bytes(b) => format!("\\x{}", hex::encode(b)),
            SqlValue::Uuid(u) => u.to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            SqlValue::DateTimeOffset(dt) => dt.to_rfc3339(),
            SqlValue::Date(d) => d.to_string(),
            SqlValue::Time(t) => t.to_string(),
            SqlValue::Raw { text, .. } => text.clone(),
        };
        Some(text)
    }

    /// Placeholder for parameter `idx` (1-based), cast to this value's type.
    #[must_use]
    pub fn placeholder(&self, idx: usize) -> String {
        match self.null_type() {
            SqlNullType::String => format!("${}::text", idx),
            other => format!("${}::text::{}", idx, other.pg_type()),
        }
    }

    /// Convert column `idx` of a PostgreSQL row.
    ///
    /// `cast` names the source type of a column that the query selected as
    /// `::text` (see [`text_cast_type`]). A value that fails to decode is an
    /// error, never a NULL.
    pub fn from_pg_row(
        row: &tokio_postgres::Row,
        idx: usize,
        cast: Option<&str>,
    ) -> Result<SqlValue> {
        if let Some(pg_type) = cast {
            return Ok(match row.try_get::<_, Option<String>>(idx)? {
                Some(text) => SqlValue::Raw {
                    text,
                    pg_type: pg_type.to_string(),
                },
                None => SqlValue::Null(SqlNullType::Other(pg_type.to_string())),
            });
        }

        let ty = row.columns()[idx].type_();
        if *ty == Type::BOOL {
            get(row, idx, SqlValue::Bool, SqlNullType::Bool)
        } else if *ty == Type::INT2 {
            get(row, idx, SqlValue::I16, SqlNullType::I16)
        } else if *ty == Type::INT4 {
            get(row, idx, SqlValue::I32, SqlNullType::I32)
        } else if *ty == Type::INT8 {
            get(row, idx, SqlValue::I64, SqlNullType::I64)
        } else if *ty == Type::FLOAT4 {
            get(row, idx, SqlValue::F32, SqlNullType::F32)
        } else if *ty == Type::FLOAT8 {
            get(row, idx, SqlValue::F64, SqlNullType::F64)
        } else if *ty == Type::UUID {
            get(row, idx, SqlValue::Uuid, SqlNullType::Uuid)
        } else if *ty == Type::TIMESTAMP {
            get(row, idx, SqlValue::DateTime, SqlNullType::DateTime)
        } else if *ty == Type::TIMESTAMPTZ {
            get(row, idx, SqlValue::DateTimeOffset, SqlNullType::DateTimeOffset)
        } else if *ty == Type::DATE {
            get(row, idx, SqlValue::Date, SqlNullType::Date)
        } else if *ty == Type::TIME {
            get(row, idx, SqlValue::Time, SqlNullType::Time)
        } else if *ty == Type::BYTEA {
            get(row, idx, SqlValue::Bytes, SqlNullType::Bytes)
        } else {
            get(row, idx, SqlValue::Text, SqlNullType::String)
        }
    }
}

fn get<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    wrap: fn(T) -> SqlValue,
    null: SqlNullType,
) -> Result<SqlValue> {
    Ok(row
        .try_get::<_, Option<T>>(idx)?
        .map_or(SqlValue::Null(null), wrap))
}

/// Types [`SqlValue::from_pg_row`] decodes natively.
const NATIVE_TYPES: &[Type] = &[
    Type::BOOL,
    Type::INT2,
    Type::INT4,
    Type::INT8,
    Type::FLOAT4,
    Type::FLOAT8,
    Type::UUID,
    Type::TIMESTAMP,
    Type::TIMESTAMPTZ,
    Type::DATE,
    Type::TIME,
    Type::BYTEA,
    Type::TEXT,
    Type::VARCHAR,
    Type::BPCHAR,
    Type::NAME,
];

/// SQL name to cast back to for a column that must be read as `::text`.
///
/// `None` for natively decoded types. Everything else (numeric, json, inet,
/// interval, arrays, enums, domains) travels as text and keeps its type name.
pub fn text_cast_type(ty: &Type) -> Option<String> {
    if NATIVE_TYPES.contains(ty) {
        return None;
    }
    if ty.schema() == "pg_catalog" {
        Some(ty.name().to_string())
    } else {
        Some(format!(
            "{}.{}",
            quote_type_part(ty.schema()),
            quote_type_part(ty.name())
        ))
    }
}

fn quote_type_part(part: &str) -> String {
    format!("\"{}\"", part.replace('"', "\"\""))
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

/// A materialized query result: column names plus positional rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert every row of a PostgreSQL result. Column names come from the
    /// prepared statement so an empty result still knows its shape.
    ///
    /// `casts[i]` is the source type of column `i` when it was selected as
    /// `::text`, as returned by [`text_cast_type`].
    pub fn from_pg(
        statement: &tokio_postgres::Statement,
        rows: &[tokio_postgres::Row],
        casts: &[Option<String>],
    ) -> Result<Self> {
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| {
                        let cast = casts.get(i).and_then(|c| c.as_deref());
                        SqlValue::from_pg_row(row, i, cast)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_is_null() {
        assert!(SqlValue::Null(SqlNullType::String).is_null());
        assert!(!SqlValue::I32(42).is_null());
    }

    #[test]
    fn test_as_i64_only_for_integers() {
        assert_eq!(SqlValue::I16(7).as_i64(), Some(7));
        assert_eq!(SqlValue::I32(-3).as_i64(), Some(-3));
        assert_eq!(SqlValue::I64(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(SqlValue::Text("12".into()).as_i64(), None);
        assert_eq!(SqlValue::F64(1.0).as_i64(), None);
        assert_eq!(SqlValue::Null(SqlNullType::I64).as_i64(), None);
    }

    #[test]
    fn test_to_text_rendering() {
        assert_eq!(SqlValue::Bool(true).to_text().as_deref(), Some("t"));
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_text().as_deref(), Some("\\xdead"));
        assert_eq!(SqlValue::Null(SqlNullType::Bool).to_text(), None);

        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 5, 0)
            .unwrap();
        assert_eq!(
            SqlValue::DateTime(dt).to_text().as_deref(),
            Some("2024-03-01 10:05:00.000000")
        );
    }

    #[test]
    fn test_placeholder_casts() {
        assert_eq!(SqlValue::Text("a".into()).placeholder(1), "$1::text");
        assert_eq!(SqlValue::I64(5).placeholder(2), "$2::text::bigint");
        assert_eq!(
            SqlValue::Null(SqlNullType::Other("numeric".into())).placeholder(3),
            "$3::text::numeric"
        );
    }

    #[test]
    fn test_raw_value_keeps_source_type() {
        let addr = SqlValue::Raw {
            text: "10.1.2.3/32".into(),
            pg_type: "inet".into(),
        };
        assert!(!addr.is_null());
        assert_eq!(addr.to_text().as_deref(), Some("10.1.2.3/32"));
        assert_eq!(addr.placeholder(1), "$1::text::inet");
        assert_eq!(
            SqlValue::Null(SqlNullType::Other("jsonb".into())).placeholder(4),
            "$4::text::jsonb"
        );
    }

    #[test]
    fn test_text_cast_type() {
        assert_eq!(text_cast_type(&Type::INET).as_deref(), Some("inet"));
        assert_eq!(text_cast_type(&Type::JSONB).as_deref(), Some("jsonb"));
        assert_eq!(text_cast_type(&Type::NUMERIC).as_deref(), Some("numeric"));
        assert_eq!(text_cast_type(&Type::INTERVAL).as_deref(), Some("interval"));
        assert_eq!(text_cast_type(&Type::INT4_ARRAY).as_deref(), Some("_int4"));
        assert_eq!(text_cast_type(&Type::INT8), None);
        assert_eq!(text_cast_type(&Type::VARCHAR), None);
        assert_eq!(text_cast_type(&Type::TIMESTAMPTZ), None);
    }

    #[test]
    fn test_row_set_column_index() {
        let set = RowSet::new(
            vec!["id".into(), "email".into()],
            vec![vec![SqlValue::I32(1), "a@b.c".into()]],
        );
        assert_eq!(set.column_index("email"), Some(1));
        assert_eq!(set.column_index("missing"), None);
        assert_eq!(set.len(), 1);
    }
}
