use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{DataSource, DbError, QueryResult, within};
use crate::schema::{ColumnDescriptor, ForeignKeyDescriptor, SchemaSnapshot, TableDescriptor};

const EXCLUDED_SCHEMAS: &str = "('pg_catalog', 'information_schema', 'pg_toast')";

/// A PostgreSQL database reached with one connection per call.
pub struct PostgresSource {
    url: String,
}

impl PostgresSource {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    async fn connect(&self) -> Result<PgConnection, DbError> {
        Ok(PgConnection::connect(&self.url).await?)
    }
}

#[async_trait]
impl DataSource for PostgresSource {
    async fn introspect(&self) -> Result<SchemaSnapshot, DbError> {
        let mut conn = self.connect().await?;
        let mut tables: BTreeMap<(String, String), TableDescriptor> = BTreeMap::new();

        let rows = sqlx::query(&format!(
            "SELECT table_schema::text, table_name::text FROM information_schema.tables \
             WHERE table_schema NOT IN {} ORDER BY table_schema, table_name",
            EXCLUDED_SCHEMAS
        ))
        .fetch_all(&mut conn)
        .await?;
        for row in &rows {
            let namespace: String = row.try_get(0)?;
            let name: String = row.try_get(1)?;
            tables.insert((namespace.clone(), name.clone()), TableDescriptor::new(namespace, name));
        }

        let rows = sqlx::query(
            "SELECT kcu.table_schema::text, kcu.table_name::text, kcu.column_name::text \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY'",
        )
        .fetch_all(&mut conn)
        .await?;
        let mut primary_keys: HashSet<(String, String, String)> = HashSet::new();
        for row in &rows {
            primary_keys.insert((row.try_get(0)?, row.try_get(1)?, row.try_get(2)?));
        }

        let rows = sqlx::query(&format!(
            "SELECT table_schema::text, table_name::text, column_name::text, data_type::text, \
             is_nullable::text FROM information_schema.columns \
             WHERE table_schema NOT IN {} ORDER BY table_schema, table_name, ordinal_position",
            EXCLUDED_SCHEMAS
        ))
        .fetch_all(&mut conn)
        .await?;
        for row in &rows {
            let namespace: String = row.try_get(0)?;
            let table: String = row.try_get(1)?;
            let column: String = row.try_get(2)?;
            let data_type: String = row.try_get(3)?;
            let nullable: String = row.try_get(4)?;

            let key = (namespace, table);
            let is_pk = primary_keys.contains(&(key.0.clone(), key.1.clone(), column.clone()));
            if let Some(descriptor) = tables.get_mut(&key) {
                let mut col = ColumnDescriptor::new(column, data_type, nullable == "YES");
                if is_pk {
                    col = col.primary_key();
                }
                descriptor.columns.push(col);
            }
        }

        let rows = sqlx::query(
            "SELECT kcu.table_schema::text, kcu.table_name::text, kcu.column_name::text, \
             ccu.table_name::text, ccu.column_name::text \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name AND ccu.table_schema = tc.table_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY'",
        )
        .fetch_all(&mut conn)
        .await?;
        for row in &rows {
            let namespace: String = row.try_get(0)?;
            let table: String = row.try_get(1)?;
            if let Some(descriptor) = tables.get_mut(&(namespace, table)) {
                descriptor.foreign_keys.push(ForeignKeyDescriptor {
                    column: row.try_get(2)?,
                    referenced_table: row.try_get(3)?,
                    referenced_column: row.try_get(4)?,
                });
            }
        }

        conn.close().await?;
        info!("Loaded {} tables from PostgreSQL", tables.len());
        Ok(SchemaSnapshot::new(tables.into_values().collect()))
    }

    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        let rows = within(timeout, async {
            let mut conn = self.connect().await?;

            let mut tx = conn.begin().await?;
            sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
            sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout.as_millis()))
                .execute(&mut *tx)
                .await?;
            let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
            tx.rollback().await?;
            Ok(rows)
        })
        .await?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows: Vec<Map<String, Value>> = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| (col.name().to_string(), map_postgres_value(row, i)))
                    .collect()
            })
            .collect();

        let execution_time_ms = start.elapsed().as_millis() as u64;
        debug!("PostgreSQL returned {} rows in {} ms", rows.len(), execution_time_ms);

        Ok(QueryResult {
            columns,
            row_count: rows.len(),
            rows,
            execution_time_ms,
        })
    }
}

fn map_postgres_value(row: &PgRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }

    let type_name = raw.type_info().name().to_string();
    match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(Value::from).unwrap_or(Value::Null),
        "INT2" => row.try_get::<i16, _>(index).map(Value::from).unwrap_or(Value::Null),
        "INT4" => row.try_get::<i32, _>(index).map(Value::from).unwrap_or(Value::Null),
        "INT8" => row.try_get::<i64, _>(index).map(Value::from).unwrap_or(Value::Null),
        "FLOAT4" => row.try_get::<f32, _>(index).map(Value::from).unwrap_or(Value::Null),
        "FLOAT8" => row.try_get::<f64, _>(index).map(Value::from).unwrap_or(Value::Null),
        "NUMERIC" => row
            .try_get::<sqlx::types::BigDecimal, _>(index)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<sqlx::types::Uuid, _>(index)
            .map(|u| Value::String(u.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(index)
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(index)
            .map(|t| Value::String(t.to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<NaiveDate, _>(index)
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row.try_get::<Value, _>(index).unwrap_or(Value::Null),
        _ => match row.try_get::<String, _>(index) {
            Ok(s) => Value::String(s),
            Err(_) => raw
                .as_bytes()
                .ok()
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .map(|s| Value::String(s.to_string()))
                .unwrap_or_else(|| Value::String(format!("<{}>", type_name))),
        },
    }
}
