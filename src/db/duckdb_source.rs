use arrow::json::{WriterBuilder, writer::JsonArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::{AccessMode, Config, Connection};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{DataSource, DbError, QueryResult};
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot, TableDescriptor};

const TABLES_QUERY: &str = "
    SELECT table_schema, table_name
    FROM information_schema.tables
    WHERE table_catalog = current_database()
      AND table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY table_schema, table_name
";

const COLUMNS_QUERY: &str = "
    SELECT table_schema, table_name, column_name, data_type, is_nullable
    FROM information_schema.columns
    WHERE table_catalog = current_database()
      AND table_schema NOT IN ('information_schema', 'pg_catalog')
    ORDER BY table_schema, table_name, ordinal_position
";

const PRIMARY_KEYS_QUERY: &str = "
    SELECT kcu.table_schema, kcu.table_name, kcu.column_name
    FROM information_schema.table_constraints tc
    JOIN information_schema.key_column_usage kcu
      ON tc.constraint_name = kcu.constraint_name
     AND tc.table_schema = kcu.table_schema
     AND tc.table_name = kcu.table_name
    WHERE tc.constraint_type = 'PRIMARY KEY'
";

const FOREIGN_KEYS_QUERY: &str = "
    SELECT fk.table_schema, fk.table_name, fk.column_name, pk.table_name, pk.column_name
    FROM information_schema.referential_constraints rc
    JOIN information_schema.key_column_usage fk
      ON fk.constraint_name = rc.constraint_name
     AND fk.constraint_schema = rc.constraint_schema
    JOIN information_schema.key_column_usage pk
      ON pk.constraint_name = rc.unique_constraint_name
     AND pk.constraint_schema = rc.unique_constraint_schema
     AND pk.ordinal_position = fk.position_in_unique_constraint
";

type TableKey = (String, String);

/// A DuckDB database file, opened read-only for every call.
pub struct DuckDbSource {
    path: String,
}

impl DuckDbSource {
    pub fn new(path: String) -> Self {
        Self { path }
    }
}

// Queries may only see the database file itself: no file, glob or URL scans.
fn open_read_only(path: &str) -> Result<Connection, DbError> {
    if path == ":memory:" {
        let config = Config::default().enable_external_access(false)?;
        return Ok(Connection::open_in_memory_with_flags(config)?);
    }
    let config = Config::default()
        .access_mode(AccessMode::ReadOnly)?
        .enable_external_access(false)?;
    Ok(Connection::open_with_flags(path, config)?)
}

fn load_schema(conn: &Connection) -> Result<SchemaSnapshot, DbError> {
    let mut tables: BTreeMap<TableKey, TableDescriptor> = BTreeMap::new();

    let mut stmt = conn.prepare(TABLES_QUERY)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
    for row in rows {
        let (namespace, name) = row?;
        tables.insert(
            (namespace.clone(), name.clone()),
            TableDescriptor::new(namespace, name),
        );
    }

    let primary_keys = load_primary_keys(conn).unwrap_or_else(|e| {
        warn!("Primary key metadata unavailable: {}", e);
        HashSet::new()
    });

    let mut stmt = conn.prepare(COLUMNS_QUERY)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)? == "YES",
        ))
    })?;
    for row in rows {
        let (namespace, table, column, data_type, nullable) = row?;
        let is_pk = primary_keys.contains(&(namespace.clone(), table.clone(), column.clone()));
        if let Some(descriptor) = tables.get_mut(&(namespace, table)) {
            let mut col = ColumnDescriptor::new(column, data_type, nullable);
            if is_pk {
                col = col.primary_key();
            }
            descriptor.columns.push(col);
        }
    }

    let foreign_keys = load_foreign_keys(conn).unwrap_or_else(|e| {
        warn!("Foreign key metadata unavailable: {}", e);
        Vec::new()
    });
    for (key, fk) in foreign_keys {
        if let Some(descriptor) = tables.get_mut(&key) {
            descriptor.foreign_keys.push(fk);
        }
    }

    Ok(SchemaSnapshot::new(tables.into_values().collect()))
}

fn load_primary_keys(conn: &Connection) -> duckdb::Result<HashSet<(String, String, String)>> {
    let mut stmt = conn.prepare(PRIMARY_KEYS_QUERY)?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
    rows.collect()
}

fn load_foreign_keys(conn: &Connection) -> duckdb::Result<Vec<(TableKey, ForeignKeyDescriptor)>> {
    let mut stmt = conn.prepare(FOREIGN_KEYS_QUERY)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            (row.get(0)?, row.get(1)?),
            ForeignKeyDescriptor {
                column: row.get(2)?,
                referenced_table: row.get(3)?,
                referenced_column: row.get(4)?,
            },
        ))
    })?;
    rows.collect()
}

/// Runs `sql` and converts the Arrow result into JSON row maps.
fn run_query(conn: &Connection, sql: &str) -> Result<QueryResult, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let arrow = stmt.query_arrow([])?;
    let schema = arrow.get_schema();
    let batches: Vec<RecordBatch> = arrow.collect();

    let columns: Vec<String> = schema.fields().iter().map(|f| f.name().clone()).collect();
    let row_count = batches.iter().map(|b| b.num_rows()).sum();

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer.write_batches(&refs)?;
    writer.finish()?;
    let buf = writer.into_inner();

    let rows = if buf.is_empty() {
        Vec::new()
    } else {
        serde_json::from_slice(&buf)?
    };

    Ok(QueryResult {
        columns,
        rows,
        row_count,
        execution_time_ms: 0,
    })
}

#[async_trait]
impl DataSource for DuckDbSource {
    async fn introspect(&self) -> Result<SchemaSnapshot, DbError> {
        let path = self.path.clone();
        let snapshot = tokio::task::spawn_blocking(move || {
            let conn = open_read_only(&path)?;
            load_schema(&conn)
        })
        .await??;
        info!("Loaded {} tables from DuckDB {}", snapshot.tables.len(), self.path);
        Ok(snapshot)
    }

    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, DbError> {
        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || open_read_only(&path)).await??;
        let interrupt = conn.interrupt_handle();

        let sql = sql.to_string();
        let start = Instant::now();
        let mut task = tokio::task::spawn_blocking(move || run_query(&conn, &sql));

        let mut result = match tokio::time::timeout(timeout, &mut task).await {
            Ok(joined) => joined??,
            Err(_) => {
                interrupt.interrupt();
                // Wait for the worker to observe the interrupt so no query outlives the call
                let _ = task.await;
                warn!("DuckDB query interrupted after {:?}", timeout);
                return Err(DbError::Timeout(timeout));
            }
        };

        result.execution_time_ms = start.elapsed().as_millis() as u64;
        debug!("DuckDB returned {} rows in {} ms", result.row_count, result.execution_time_ms);
        Ok(result)
    }
}
