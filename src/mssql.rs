//! SQL Server source over TDS (tiberius).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{AuthMethod, Client, ColumnData, Config, FromSql, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::conn_string::{DEFAULT_PORT, SqlServerParams};
use crate::error::{EtlError, EtlResult};
use crate::extract::Source;
use crate::frame::{Frame, Value};

/// A live, single-owner connection to the source database.
pub struct SqlServerSource {
    client: Client<Compat<TcpStream>>,
}

impl SqlServerSource {
    /// Open a connection. A named instance without a port is resolved
    /// through the SQL Server Browser service.
    pub async fn connect(params: &SqlServerParams) -> EtlResult<Self> {
        let config = tds_config(params);
        info!(host = %params.host, instance = ?params.instance, port = ?params.port, database = %params.database, "connecting to source");

        let tcp = if params.needs_browser() {
            TcpStream::connect_named(&config)
                .await
                .map_err(|e| EtlError::SourceConnection(e.to_string()))?
        } else {
            TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| EtlError::SourceConnection(e.to_string()))?
        };
        tcp.set_nodelay(true)
            .map_err(|e| EtlError::SourceConnection(e.to_string()))?;

        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| EtlError::SourceConnection(e.to_string()))?;

        Ok(Self { client })
    }

    /// Close the connection gracefully.
    pub async fn close(self) -> EtlResult<()> {
        self.client
            .close()
            .await
            .map_err(|e| EtlError::SourceConnection(e.to_string()))
    }
}

impl Source for SqlServerSource {
    async fn fetch(&mut self, sql: &str) -> EtlResult<Frame> {
        let mut stream = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| EtlError::Query(e.to_string()))?;

        // Read the metadata first so empty results still carry column names.
        let columns: Vec<String> = stream
            .columns()
            .await
            .map_err(|e| EtlError::Query(e.to_string()))?
            .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = stream
            .into_first_result()
            .await
            .map_err(|e| EtlError::Query(e.to_string()))?;

        let mut frame = Frame::new(columns);
        for row in rows {
            let values = row
                .into_iter()
                .zip(frame.columns())
                .map(|(data, column)| to_value(&data, column))
                .collect::<EtlResult<Vec<_>>>()?;
            frame.push_row(values)?;
        }

        debug!(rows = frame.len(), columns = frame.width(), "query complete");
        Ok(frame)
    }
}

/// TDS client settings for `params`. The port is left unset for a named
/// instance without one, so the address points at the Browser service.
fn tds_config(params: &SqlServerParams) -> Config {
    let mut config = Config::new();
    config.host(&params.host);
    match (params.port, &params.instance) {
        (Some(port), _) => config.port(port),
        (None, Some(_)) => {}
        (None, None) => config.port(DEFAULT_PORT),
    }
    config.database(&params.database);
    config.authentication(AuthMethod::sql_server(&params.user, &params.password));
    if let Some(instance) = &params.instance {
        config.instance_name(instance);
    }
    if params.trust_server_certificate {
        config.trust_cert();
    }
    config
}

/// Map one TDS cell to a frame value.
fn to_value(data: &ColumnData<'static>, column: &str) -> EtlResult<Value> {
    let value = match data {
        ColumnData::U8(v) => v.map(|n| Value::Int(i64::from(n))),
        ColumnData::I16(v) => v.map(|n| Value::Int(i64::from(n))),
        ColumnData::I32(v) => v.map(|n| Value::Int(i64::from(n))),
        ColumnData::I64(v) => v.map(Value::Int),
        ColumnData::F32(v) => v.map(|n| Value::Float(f64::from(n))),
        ColumnData::F64(v) => v.map(Value::Float),
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| Value::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| Value::Text(g.to_string())),
        ColumnData::Numeric(v) => v
            .as_ref()
            .map(|n| Value::Float(decimal_to_f64(n.value(), n.scale()))),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .map_err(|e| decode_error(column, e))?
                .map(Value::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(|e| decode_error(column, e))?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Value::Timestamp),
        ColumnData::DateTimeOffset(_) => DateTime::<Utc>::from_sql(data)
            .map_err(|e| decode_error(column, e))?
            .map(|ts| Value::Timestamp(ts.naive_utc())),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map_err(|e| decode_error(column, e))?
            .map(|t| Value::Text(t.to_string())),
        // binary and xml
        _ => return Err(EtlError::mismatch(column, "scalar", "binary or xml")),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decimal_to_f64(unscaled: i128, scale: u8) -> f64 {
    unscaled as f64 / 10f64.powi(i32::from(scale))
}

fn decode_error(column: &str, e: tiberius::error::Error) -> EtlError {
    EtlError::Query(format!("column '{}': {}", column, e))
}
