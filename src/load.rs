//! Destination loading.
//!
//! Every load is a full replace: the destination table is dropped and
//! recreated from the frame's columns, with column types inferred from the
//! data, then filled. Nothing is merged or appended.
//!
//! With [`LoadStrategy::Transactional`] the drop, create and inserts share one
//! PostgreSQL transaction, so a failed load leaves the previous table intact.
//! [`LoadStrategy::Swap`] fills a `<table>__staging` table first and only holds
//! the target's lock for the final drop-and-rename.

use sqlx::postgres::{PgConnection, Postgres};
use sqlx::{Connection, QueryBuilder};
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};

use crate::config::{DestinationConfig, LoadOptions, LoadStrategy};
use crate::error::{EtlError, EtlResult};
use crate::frame::{Frame, Value};

/// PostgreSQL caps a statement at 65 535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

/// Suffix of the table a [`LoadStrategy::Swap`] load fills first.
pub const STAGING_SUFFIX: &str = "__staging";

/// Somewhere a frame can be written as a named table.
pub trait Destination {
    /// Replace `table` with the contents of `frame`; returns rows written.
    fn replace_table(&mut self, table: &str, frame: &Frame) -> impl Future<Output = EtlResult<u64>> + Send;
}

/// Column type inferred for the destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    BigInt,
    Double,
    Timestamp,
    Text,
}

impl ColumnType {
    pub fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Text => "TEXT",
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Int(_) => Some(ColumnType::BigInt),
            Value::Float(_) => Some(ColumnType::Double),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    /// The narrowest type that holds values of both `self` and `other`.
    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (ColumnType::BigInt, ColumnType::Double) | (ColumnType::Double, ColumnType::BigInt) => {
                ColumnType::Double
            }
            _ => ColumnType::Text,
        }
    }
}

/// Infer one type per column from the non-null values. All-null columns are TEXT.
pub fn infer_column_types(frame: &Frame) -> Vec<ColumnType> {
    (0..frame.width())
        .map(|idx| {
            frame
                .rows()
                .iter()
                .filter_map(|row| ColumnType::of(&row[idx]))
                .reduce(ColumnType::widen)
                .unwrap_or(ColumnType::Text)
        })
        .collect()
}

/// A possibly schema-qualified table name. Displays quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn staging(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            name: format!("{}{}", self.name, STAGING_SUFFIX),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => write!(f, "{}", quote_ident(&self.name)),
        }
    }
}

/// Double-quote an identifier, doubling embedded quotes. Case is preserved.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn drop_table_sql(table: &TableRef) -> String {
    format!("DROP TABLE IF EXISTS {}", table)
}

pub fn create_table_sql(table: &TableRef, columns: &[String], types: &[ColumnType]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .zip(types)
        .map(|(name, ty)| format!("{} {}", quote_ident(name), ty.sql_name()))
        .collect();
    format!("CREATE TABLE {} ({})", table, defs.join(", "))
}

fn insert_prefix(table: &TableRef, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    format!("INSERT INTO {} ({}) ", table, cols.join(", "))
}

/// Rows per INSERT: the configured batch size, capped by the bind limit.
pub fn rows_per_batch(width: usize, batch_size: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).min(batch_size).max(1)
}

/// PostgreSQL destination over a single sqlx connection.
pub struct PgDestination {
    conn: PgConnection,
    schema: Option<String>,
    options: LoadOptions,
}

impl PgDestination {
    /// Open a connection.
    pub async fn connect(config: &DestinationConfig, options: LoadOptions) -> EtlResult<Self> {
        let connect_options = config.connect_options()?;
        info!(destination = %config.describe(), "connecting to destination");

        let conn = PgConnection::connect_with(&connect_options)
            .await
            .map_err(|e| EtlError::DestinationConnection(e.to_string()))?;

        Ok(Self {
            conn,
            schema: config.schema.clone(),
            options,
        })
    }

    /// Close the connection gracefully.
    pub async fn close(self) -> EtlResult<()> {
        self.conn
            .close()
            .await
            .map_err(|e| EtlError::DestinationConnection(e.to_string()))
    }

    async fn replace_in_transaction(
        &mut self,
        target: &TableRef,
        frame: &Frame,
        types: &[ColumnType],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.conn.begin().await?;
        execute(&mut tx, &drop_table_sql(target)).await?;
        execute(&mut tx, &create_table_sql(target, frame.columns(), types)).await?;
        let written = insert_rows(&mut tx, target, frame, types, self.options.batch_size).await?;
        tx.commit().await?;
        Ok(written)
    }

    async fn replace_by_swap(
        &mut self,
        target: &TableRef,
        frame: &Frame,
        types: &[ColumnType],
    ) -> Result<u64, sqlx::Error> {
        let staging = target.staging();
        match self.fill_and_swap(target, &staging, frame, types).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(cleanup) = execute(&mut self.conn, &drop_table_sql(&staging)).await {
                    warn!(table = %staging, error = %cleanup, "failed to drop staging table");
                }
                Err(e)
            }
        }
    }

    async fn fill_and_swap(
        &mut self,
        target: &TableRef,
        staging: &TableRef,
        frame: &Frame,
        types: &[ColumnType],
    ) -> Result<u64, sqlx::Error> {
        execute(&mut self.conn, &drop_table_sql(staging)).await?;
        execute(&mut self.conn, &create_table_sql(staging, frame.columns(), types)).await?;
        let written = insert_rows(&mut self.conn, staging, frame, types, self.options.batch_size).await?;

        let mut tx = self.conn.begin().await?;
        execute(&mut tx, &drop_table_sql(target)).await?;
        execute(
            &mut tx,
            &format!("ALTER TABLE {} RENAME TO {}", staging, quote_ident(&target.name)),
        )
        .await?;
        tx.commit().await?;
        Ok(written)
    }
}

impl Destination for PgDestination {
    async fn replace_table(&mut self, table: &str, frame: &Frame) -> EtlResult<u64> {
        let target = TableRef::new(self.schema.as_deref(), table);
        let types = infer_column_types(frame);

        let written = match self.options.strategy {
            LoadStrategy::Transactional => self.replace_in_transaction(&target, frame, &types).await,
            LoadStrategy::Swap => self.replace_by_swap(&target, frame, &types).await,
        }
        .map_err(|e| EtlError::load(table, e))?;

        info!(table, rows = written, "table loaded");
        Ok(written)
    }
}

async fn execute(conn: &mut PgConnection, sql: &str) -> Result<(), sqlx::Error> {
    debug!(sql, "executing");
    sqlx::query(sql).execute(&mut *conn).await?;
    Ok(())
}

async fn insert_rows(
    conn: &mut PgConnection,
    table: &TableRef,
    frame: &Frame,
    types: &[ColumnType],
    batch_size: usize,
) -> Result<u64, sqlx::Error> {
    let per_batch = rows_per_batch(frame.width(), batch_size);
    let prefix = insert_prefix(table, frame.columns());
    let mut written = 0u64;

    for chunk in frame.rows().chunks(per_batch) {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(&prefix);
        builder.push_values(chunk, |mut row_builder, row| {
            // Nulls bind as typed nulls of the column's type.
            for (value, ty) in row.iter().zip(types) {
                match ty {
                    ColumnType::Boolean => row_builder.push_bind(value.as_bool()),
                    ColumnType::BigInt => row_builder.push_bind(value.as_i64()),
                    ColumnType::Double => row_builder.push_bind(value.as_f64()),
                    ColumnType::Timestamp => row_builder.push_bind(value.as_timestamp()),
                    ColumnType::Text => row_builder.push_bind(value.to_text()),
                };
            }
        });
        written += builder.build().execute(&mut *conn).await?.rows_affected();
    }

    Ok(written)
}

/// Writes nothing; records what a real load would have done.
#[derive(Debug, Default)]
pub struct DryRunDestination {
    /// `(table, rows)` in load order.
    pub tables: Vec<(String, u64)>,
}

impl Destination for DryRunDestination {
    async fn replace_table(&mut self, table: &str, frame: &Frame) -> EtlResult<u64> {
        let target = TableRef::new(None, table);
        let types = infer_column_types(frame);
        debug!(sql = %create_table_sql(&target, frame.columns(), &types), "dry run");

        let rows = frame.len() as u64;
        info!(table, rows, "dry run: table not written");
        self.tables.push((table.to_string(), rows));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn frame() -> Frame {
        let ts = NaiveDate::from_ymd_opt(2025, 3, 7)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Frame::new(["Status", "status", "Profit", "OrderDate", "note", "flag"])
            .with_row(vec![5.into(), "Shipped".into(), 6.into(), ts.into(), Value::Null, true.into()])
            .unwrap()
            .with_row(vec![9.into(), Value::Null, 6.5.into(), ts.into(), Value::Null, 1.into()])
            .unwrap()
    }

    #[test]
    fn test_infer_column_types() {
        assert_eq!(
            infer_column_types(&frame()),
            vec![
                ColumnType::BigInt,
                ColumnType::Text,
                ColumnType::Double,
                ColumnType::Timestamp,
                ColumnType::Text,
                ColumnType::Text,
            ]
        );
    }

    #[test]
    fn test_create_table_sql_quotes_identifiers() {
        let frame = frame();
        let types = infer_column_types(&frame);
        let sql = create_table_sql(&TableRef::new(Some("dw"), "fato_vendas"), frame.columns(), &types);
        assert_eq!(
            sql,
            "CREATE TABLE \"dw\".\"fato_vendas\" (\"Status\" BIGINT, \"status\" TEXT, \"Profit\" DOUBLE PRECISION, \"OrderDate\" TIMESTAMP, \"note\" TEXT, \"flag\" TEXT)"
        );
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_drop_and_staging_names() {
        let table = TableRef::new(None, "dim_data");
        assert_eq!(drop_table_sql(&table), "DROP TABLE IF EXISTS \"dim_data\"");
        assert_eq!(table.staging().to_string(), "\"dim_data__staging\"");
    }

    #[test]
    fn test_insert_prefix() {
        let table = TableRef::new(None, "dim_produto");
        let cols = vec!["id_produto".to_string(), "nome_produto".to_string()];
        assert_eq!(
            insert_prefix(&table, &cols),
            "INSERT INTO \"dim_produto\" (\"id_produto\", \"nome_produto\") "
        );
    }

    #[test]
    fn test_rows_per_batch() {
        assert_eq!(rows_per_batch(12, 1000), 1000);
        assert_eq!(rows_per_batch(100, 1000), 655);
        assert_eq!(rows_per_batch(0, 10), 10);
        assert_eq!(rows_per_batch(70_000, 1000), 1);
    }

    #[tokio::test]
    async fn test_dry_run_records_tables() {
        let mut dest = DryRunDestination::default();
        let rows = dest.replace_table("fato_vendas", &frame()).await.unwrap();
        assert_eq!(rows, 2);
        assert_eq!(dest.tables, vec![("fato_vendas".to_string(), 2)]);
    }
}
