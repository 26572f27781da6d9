use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tiberius::{Client, ColumnData, Config, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use super::{DataSource, DbError, QueryResult, within};
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot, TableDescriptor};

const TABLES_QUERY: &str = "
    SELECT TABLE_SCHEMA, TABLE_NAME
    FROM INFORMATION_SCHEMA.TABLES
    WHERE TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_SCHEMA, TABLE_NAME
";

const COLUMNS_QUERY: &str = "
    SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, DATA_TYPE, IS_NULLABLE
    FROM INFORMATION_SCHEMA.COLUMNS
    ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION
";

const PRIMARY_KEYS_QUERY: &str = "
    SELECT kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.COLUMN_NAME
    FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
      ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
    WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
";

const FOREIGN_KEYS_QUERY: &str = "
    SELECT fk.TABLE_SCHEMA, fk.TABLE_NAME, fk.COLUMN_NAME, pk.TABLE_NAME, pk.COLUMN_NAME
    FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE fk
      ON fk.CONSTRAINT_NAME = rc.CONSTRAINT_NAME AND fk.CONSTRAINT_SCHEMA = rc.CONSTRAINT_SCHEMA
    JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE pk
      ON pk.CONSTRAINT_NAME = rc.UNIQUE_CONSTRAINT_NAME
     AND pk.CONSTRAINT_SCHEMA = rc.UNIQUE_CONSTRAINT_SCHEMA
     AND pk.ORDINAL_POSITION = fk.ORDINAL_POSITION
";

type SqlServerClient = Client<Compat<TcpStream>>;

/// A SQL Server database reached over TDS, one connection per call.
/// Accepts ADO.NET style connection strings.
pub struct SqlServerSource {
    config: Config,
}

impl SqlServerSource {
    pub fn new(connection_string: &str) -> Result<Self, DbError> {
        let config = Config::from_ado_string(connection_string)
            .map_err(|e| DbError::InvalidConfig(format!("invalid SQL Server connection string: {}", e)))?;
        Ok(Self { config })
    }

    async fn connect(&self) -> Result<SqlServerClient, DbError> {
        let tcp = TcpStream::connect(self.config.get_addr()).await?;
        tcp.set_nodelay(true)?;
        Ok(Client::connect(self.config.clone(), tcp.compat_write()).await?)
    }
}

async fn fetch(client: &mut SqlServerClient, sql: &str) -> Result<Vec<Row>, DbError> {
    Ok(client.simple_query(sql).await?.into_first_result().await?)
}

fn text(row: &Row, index: usize) -> Result<String, DbError> {
    Ok(row.try_get::<&str, _>(index)?.unwrap_or_default().to_string())
}

#[async_trait]
impl DataSource for SqlServerSource {
    async fn introspect(&self) -> Result<SchemaSnapshot, DbError> {
        let mut client = self.connect().await?;
        let mut tables: BTreeMap<(String, String), TableDescriptor> = BTreeMap::new();

        for row in fetch(&mut client, TABLES_QUERY).await? {
            let namespace = text(&row, 0)?;
            let name = text(&row, 1)?;
            tables.insert((namespace.clone(), name.clone()), TableDescriptor::new(namespace, name));
        }

        let mut primary_keys: HashSet<(String, String, String)> = HashSet::new();
        for row in fetch(&mut client, PRIMARY_KEYS_QUERY).await? {
            primary_keys.insert((text(&row, 0)?, text(&row, 1)?, text(&row, 2)?));
        }

        for row in fetch(&mut client, COLUMNS_QUERY).await? {
            let key = (text(&row, 0)?, text(&row, 1)?);
            let column = text(&row, 2)?;
            let is_pk = primary_keys.contains(&(key.0.clone(), key.1.clone(), column.clone()));
            if let Some(descriptor) = tables.get_mut(&key) {
                let mut col = ColumnDescriptor::new(column, text(&row, 3)?, text(&row, 4)? == "YES");
                if is_pk {
                    col = col.primary_key();
                }
                descriptor.columns.push(col);
            }
        }

        for row in fetch(&mut client, FOREIGN_KEYS_QUERY).await? {
            if let Some(descriptor) = tables.get_mut(&(text(&row, 0)?, text(&row, 1)?)) {
                descriptor.foreign_keys.push(ForeignKeyDescriptor {
                    column: text(&row, 2)?,
                    referenced_table: text(&row, 3)?,
                    referenced_column: text(&row, 4)?,
                });
            }
        }

        info!("Loaded {} tables from SQL Server", tables.len());
        Ok(SchemaSnapshot::new(tables.into_values().collect()))
    }

    // T-SQL has no statement timeout; dropping the client at the deadline
    // closes the session and the server abandons the batch.
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        let mut result = within(timeout, async {
            let mut client = self.connect().await?;
            client.simple_query("BEGIN TRANSACTION").await?.into_results().await?;

            let mut stream = client.simple_query(sql).await?;
            let columns: Vec<String> = stream
                .columns()
                .await?
                .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();
            let rows = stream.into_first_result().await?;

            client.simple_query("ROLLBACK TRANSACTION").await?.into_results().await?;
            Ok(to_query_result(columns, &rows))
        })
        .await?;

        result.execution_time_ms = start.elapsed().as_millis() as u64;
        debug!("SQL Server returned {} rows in {} ms", result.row_count, result.execution_time_ms);
        Ok(result)
    }
}

fn to_query_result(columns: Vec<String>, rows: &[Row]) -> QueryResult {
    let rows: Vec<Map<String, Value>> = rows
        .iter()
        .map(|row| {
            row.cells()
                .enumerate()
                .map(|(i, (col, data))| (col.name().to_string(), map_sqlserver_value(row, i, data)))
                .collect()
        })
        .collect();

    QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        execution_time_ms: 0,
    }
}

fn map_sqlserver_value(row: &Row, index: usize, data: &ColumnData<'static>) -> Value {
    match data {
        ColumnData::U8(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I16(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I32(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::I64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::F32(v) => v.map(|f| Value::from(f as f64)).unwrap_or(Value::Null),
        ColumnData::F64(v) => v.map(Value::from).unwrap_or(Value::Null),
        ColumnData::Bit(v) => v.map(Value::Bool).unwrap_or(Value::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null),
        ColumnData::Guid(v) => v.as_ref().map(|g| Value::String(g.to_string())).unwrap_or(Value::Null),
        ColumnData::Numeric(v) => v.as_ref().map(|n| Value::String(n.to_string())).unwrap_or(Value::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| Value::String(format!("<{} bytes>", b.len())))
            .unwrap_or(Value::Null),
        _ => temporal_value(row, index),
    }
}

// Date and time columns come in several wire shapes; chrono decodes all of them.
fn temporal_value(row: &Row, index: usize) -> Value {
    if let Ok(Some(ts)) = row.try_get::<NaiveDateTime, _>(index) {
        return Value::String(ts.to_string());
    }
    if let Ok(Some(ts)) = row.try_get::<DateTime<FixedOffset>, _>(index) {
        return Value::String(ts.to_rfc3339());
    }
    if let Ok(Some(date)) = row.try_get::<NaiveDate, _>(index) {
        return Value::String(date.to_string());
    }
    if let Ok(Some(time)) = row.try_get::<NaiveTime, _>(index) {
        return Value::String(time.to_string());
    }
    Value::Null
}
