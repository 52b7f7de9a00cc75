//! PostgreSQL backend over a shared sqlx pool.

use super::{id_key, Record, Scope, Store};
use crate::config::ResolvedResource;
use crate::error::AppError;
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use std::collections::HashMap;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<PgRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn query_optional(&self, q: &QueryBuf) -> Result<Option<PgRow>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        query.fetch_optional(&self.pool).await.map_err(map_write_error)
    }
}

/// Constraint violations become client-facing errors; everything else stays a database error.
fn map_write_error(e: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        let constraint = db.constraint().unwrap_or_default().to_string();
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => return AppError::DuplicateKey(constraint),
            Some(FOREIGN_KEY_VIOLATION) => {
                return AppError::PreconditionFailed(format!("violates reference constraint {}", constraint))
            }
            _ => {}
        }
    }
    AppError::Db(e)
}

#[async_trait]
impl Store for PgStore {
    async fn find(&self, resource: &ResolvedResource) -> Result<Vec<Record>, AppError> {
        let rows = self.query_many(&sql::select_list(resource)).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn find_first(&self, resource: &ResolvedResource) -> Result<Option<Record>, AppError> {
        let row = self.query_optional(&sql::select_first(resource)).await?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn find_by_id(
        &self,
        resource: &ResolvedResource,
        id: &Value,
        scope: Scope,
    ) -> Result<Option<Record>, AppError> {
        let row = self.query_optional(&sql::select_by_id(resource, id, scope)).await?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn insert(&self, resource: &ResolvedResource, fields: Record) -> Result<Value, AppError> {
        let row = self
            .query_optional(&sql::insert(resource, &fields))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))?;
        Ok(cell_to_value(&row, "id"))
    }

    async fn update(&self, resource: &ResolvedResource, id: &Value, fields: Record) -> Result<bool, AppError> {
        let row = self.query_optional(&sql::update(resource, id, &fields)).await?;
        Ok(row.is_some())
    }

    async fn delete(&self, resource: &ResolvedResource, id: &Value) -> Result<bool, AppError> {
        let row = self.query_optional(&sql::delete(resource, id)).await?;
        Ok(row.is_some())
    }

    async fn find_related(
        &self,
        resource: &ResolvedResource,
        ids: &[Value],
        display_field: &str,
    ) -> Result<HashMap<String, Value>, AppError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = self.query_many(&sql::select_display(resource, display_field, ids)).await?;
        Ok(rows
            .iter()
            .map(|r| (id_key(&cell_to_value(r, "id")), cell_to_value(r, display_field)))
            .collect())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("postgres pool closed");
    }
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::{Column, Row};
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339_opts(chrono::SecondsFormat::Micros, true));
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
