// PostgreSQL provider using connection pooling for optimal resource management
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use deadpool_postgres::Pool;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio_postgres::types::{ToSql, Type};
use url::Url;

use crate::error::AppError;
use crate::models::{DatabaseType, PreparedStatement, Row, RowSet};
use crate::services::connection_pool::ConnectionPoolManager;
use crate::services::database::provider::{
    decimal_to_json, json_to_decimal, timeout_error, Provider, DEFAULT_STATEMENT_TIMEOUT,
};

type Param = Box<dyn ToSql + Sync + Send>;

pub struct PostgreSQLProvider {
    pool: Pool,
    timeout: Duration,
}

impl PostgreSQLProvider {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    /// Validate the URL and take a pool for it from the manager
    pub async fn connect(connection_url: &str, pool_manager: &ConnectionPoolManager) -> Result<Self, AppError> {
        let url = Url::parse(connection_url)
            .map_err(|e| AppError::Configuration(format!("Invalid PostgreSQL URL: {}", e)))?;

        if url.scheme() != "postgresql" && url.scheme() != "postgres" {
            return Err(AppError::Configuration(
                "URL must use postgresql:// or postgres:// scheme".to_string(),
            ));
        }

        let pool = pool_manager.postgres_pool(connection_url).await?;
        Ok(Self::new(pool))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, statement: &PreparedStatement) -> Result<RowSet, AppError> {
        let client = self.pool.get().await?;
        let start_time = Instant::now();

        // The server infers parameter types; bind each JSON value accordingly
        let prepared = client.prepare(&statement.sql).await?;
        let params: Vec<Param> = statement
            .params
            .iter()
            .zip(prepared.params())
            .map(|(value, ty)| to_sql_param(value, ty))
            .collect::<Result<_, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        if !statement.returns_rows() {
            let affected = client.execute(&prepared, &refs).await?;
            return Ok(RowSet::from_write(
                affected,
                None,
                start_time.elapsed().as_millis() as u64,
            ));
        }

        let rows = client.query(&prepared, &refs).await?;
        let mut json_rows = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut row_obj = Row::new();
            for (idx, column) in row.columns().iter().enumerate() {
                if row_obj.contains_key(column.name()) {
                    continue;
                }
                row_obj.insert(column.name().to_string(), column_to_json(row, idx, column.type_())?);
            }
            json_rows.push(row_obj);
        }

        Ok(RowSet::from_rows(json_rows, start_time.elapsed().as_millis() as u64))
    }
}

#[async_trait::async_trait]
impl Provider for PostgreSQLProvider {
    async fn execute(&self, statement: &PreparedStatement) -> Result<RowSet, AppError> {
        tokio::time::timeout(self.timeout, self.run(statement))
            .await
            .map_err(|_| timeout_error(self.timeout))?
            .map_err(|e| {
                tracing::error!("PostgreSQL statement failed: {}", e);
                e
            })
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

/// Bind `value` with `T`, keeping NULL typed so the driver accepts it
fn typed<T, F>(value: &Value, ty: &Type, convert: F) -> Result<Param, AppError>
where
    T: ToSql + Sync + Send + 'static,
    F: FnOnce(&Value) -> Option<T>,
{
    if value.is_null() {
        return Ok(Box::new(None::<T>));
    }
    match convert(value) {
        Some(v) => Ok(Box::new(Some(v))),
        None => Err(AppError::Validation(format!(
            "Cannot bind {} as PostgreSQL {}",
            value,
            ty.name()
        ))),
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

fn to_sql_param(value: &Value, ty: &Type) -> Result<Param, AppError> {
    match *ty {
        Type::BOOL => typed(value, ty, Value::as_bool),
        Type::INT2 => typed(value, ty, |v| v.as_i64().and_then(|n| i16::try_from(n).ok())),
        Type::INT4 => typed(value, ty, |v| v.as_i64().and_then(|n| i32::try_from(n).ok())),
        Type::INT8 => typed(value, ty, Value::as_i64),
        Type::FLOAT4 => typed(value, ty, |v| v.as_f64().map(|f| f as f32)),
        Type::FLOAT8 => typed(value, ty, Value::as_f64),
        Type::NUMERIC => typed(value, ty, json_to_decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => typed(value, ty, |v| {
            Some(match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        }),
        Type::JSON | Type::JSONB => Ok(Box::new(value.clone())),
        Type::TIMESTAMPTZ => typed(value, ty, |v| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        }),
        Type::TIMESTAMP => typed(value, ty, |v| v.as_str().and_then(parse_timestamp)),
        Type::DATE => typed(value, ty, |v| {
            v.as_str().and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        }),
        _ => Err(AppError::Database(format!(
            "Unsupported PostgreSQL parameter type '{}'",
            ty.name()
        ))),
    }
}

fn column_to_json(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Result<Value, AppError> {
    let value = match *ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| json!(v)),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| json!(v)),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(|v| json!(v)),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| json!(v)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(|v| json!(v)),
        // AVG and SUM over integers come back as NUMERIC
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.map(decimal_to_json),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(|v| json!(v)),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?,
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| json!(v.to_rfc3339())),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| json!(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| json!(v.to_string())),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(v) => v.map(Value::String),
            // For types that can't be converted to string,
            // show the type name as placeholder
            Err(_) => Some(json!(format!("<{}>", ty.name()))),
        },
    };
    Ok(value.unwrap_or(Value::Null))
}
