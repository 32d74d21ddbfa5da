//! Database gateway: one connection, one statement, then close.

use crate::config::DatabaseConfig;
use crate::db::value::{CellValue, Record};
use crate::error::DbError;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgSslMode};
use sqlx::{Column, Connection, Either, Executor, Row, TypeInfo};
use std::str::FromStr;
use tracing::{debug, warn};

/// Executes a SQL statement and returns its rows.
#[async_trait]
pub trait DatabaseGateway: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<Record>, DbError>;
}

/// PostgreSQL gateway. Holds no connection between calls.
#[derive(Debug, Clone)]
pub struct PgGateway {
    url: String,
    ssl_mode: PgSslMode,
}

impl PgGateway {
    pub fn new(url: impl Into<String>, ssl_mode: PgSslMode) -> Self {
        Self {
            url: url.into(),
            ssl_mode,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(config.url.clone(), config.ssl_mode)
    }

    async fn connect(&self) -> Result<PgConnection, DbError> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| DbError::Connect(e.to_string()))?
            .ssl_mode(self.ssl_mode);

        PgConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::Connect(e.to_string()))
    }
}

#[async_trait]
impl DatabaseGateway for PgGateway {
    async fn execute(&self, sql: &str) -> Result<Vec<Record>, DbError> {
        let mut conn = self.connect().await?;

        let result = fetch_last_result_set(&mut conn, sql).await;

        if let Err(e) = conn.close().await {
            warn!("Failed to close database connection: {}", e);
        }

        let rows = result.map_err(|e| DbError::Query(e.to_string()))?;
        debug!("Query returned {} rows", rows.len());

        rows.iter().map(row_to_record).collect()
    }
}

/// Runs `sql` with the simple-query protocol (no parameters, text values)
/// and keeps only the rows of the last statement.
async fn fetch_last_result_set(
    conn: &mut PgConnection,
    sql: &str,
) -> Result<Vec<PgRow>, sqlx::Error> {
    let mut stream = conn.fetch_many(sqlx::raw_sql(sql));
    let mut current = Vec::new();
    let mut completed = Vec::new();

    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(_) => completed = std::mem::take(&mut current),
            Either::Right(row) => current.push(row),
        }
    }

    if current.is_empty() {
        Ok(completed)
    } else {
        Ok(current)
    }
}

fn row_to_record(row: &PgRow) -> Result<Record, DbError> {
    row.columns()
        .iter()
        .map(|column| {
            let raw: Option<String> = row
                .try_get_unchecked(column.ordinal())
                .map_err(|e| DbError::Query(e.to_string()))?;
            let value = CellValue::from_pg_text(column.type_info().name(), raw.as_deref());
            Ok((column.name().to_string(), value))
        })
        .collect()
}
