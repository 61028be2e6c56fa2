//! Single-attempt SQL execution on one tokio-postgres client.

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

use crate::core::traits::Executor;
use crate::core::value::{text_cast_type, RowSet, SqlValue};
use crate::error::Result;

/// Executes statements on an open client.
///
/// Parameters travel as text (`Option<String>`) and are cast back to their
/// type in the statement, see [`SqlValue::placeholder`].
pub struct PgExecutor {
    client: Client,
}

impl PgExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn text_params<'a, I>(values: I) -> Vec<Option<String>>
where
    I: IntoIterator<Item = &'a SqlValue>,
{
    values.into_iter().map(SqlValue::to_text).collect()
}

/// Wrap `sql` so the columns in `casts` come back as text.
fn text_cast_query(sql: &str, columns: &[String], casts: &[Option<String>]) -> String {
    let select: Vec<String> = columns
        .iter()
        .zip(casts)
        .map(|(name, cast)| {
            let quoted = format!("\"{}\"", name.replace('"', "\"\""));
            match cast {
                Some(_) => format!("{}::text AS {}", quoted, quoted),
                None => quoted,
            }
        })
        .collect();
    format!("SELECT {} FROM ({}) AS src", select.join(", "), sql)
}

fn param_refs(params: &[Option<String>]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

#[async_trait]
impl Executor for PgExecutor {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet> {
        let mut statement = self.client.prepare(sql).await?;
        let casts: Vec<Option<String>> = statement
            .columns()
            .iter()
            .map(|c| text_cast_type(c.type_()))
            .collect();
        if casts.iter().any(Option::is_some) {
            let columns: Vec<String> = statement
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            statement = self
                .client
                .prepare(&text_cast_query(sql, &columns, &casts))
                .await?;
        }

        let text = text_params(params);
        let rows = self.client.query(&statement, &param_refs(&text)).await?;
        RowSet::from_pg(&statement, &rows, &casts)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let text = text_params(params);
        Ok(self.client.execute(sql, &param_refs(&text)).await?)
    }

    async fn execute_batch(&self, sql: &str, rows: &[Vec<SqlValue>]) -> Result<u64> {
        let text = text_params(rows.iter().flatten());
        self.client.batch_execute("BEGIN").await?;
        match self.client.execute(sql, &param_refs(&text)).await {
            Ok(affected) => {
                self.client.batch_execute("COMMIT").await?;
                Ok(affected)
            }
            Err(e) => {
                // leave the session usable for the next table
                let _ = self.client.batch_execute("ROLLBACK").await;
                Err(e.into())
            }
        }
    }

    async fn rollback(&self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }
}
