//! Storage backends behind one interface: find / find_by_id / insert / update / delete /
//! find_related, plus the newest-record lookup used for reference fallbacks.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::config::{ResolvedModel, ResolvedResource};
use crate::error::AppError;
use crate::migration::apply_migrations;
use crate::settings::{Settings, StorageBackend};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// One flat record, column name to value.
pub type Record = Map<String, Value>;

/// Which rows a lookup sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Rows without `deleted_at` (every row under the hard-delete policy).
    Live,
    /// Soft-deleted rows too. Internal use only; never routed.
    All,
}

/// Current time as stored in `created_at` / `updated_at` / `deleted_at`.
pub fn now_timestamp() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
}

/// Map key for an identity value: numbers and strings alike.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Every live record, newest first.
    async fn find(&self, resource: &ResolvedResource) -> Result<Vec<Record>, AppError>;

    /// Newest live record, if any.
    async fn find_first(&self, resource: &ResolvedResource) -> Result<Option<Record>, AppError> {
        Ok(self.find(resource).await?.into_iter().next())
    }

    async fn find_by_id(&self, resource: &ResolvedResource, id: &Value, scope: Scope)
        -> Result<Option<Record>, AppError>;

    /// Persist `fields`; an absent `id` is assigned by the backend. Returns the identity.
    /// Uniqueness violations surface as `AppError::DuplicateKey`.
    async fn insert(&self, resource: &ResolvedResource, fields: Record) -> Result<Value, AppError>;

    /// Merge `fields` onto a live record. `false` when no such record.
    async fn update(&self, resource: &ResolvedResource, id: &Value, fields: Record) -> Result<bool, AppError>;

    /// Remove (or soft-delete) a live record. `false` when no such record.
    async fn delete(&self, resource: &ResolvedResource, id: &Value) -> Result<bool, AppError>;

    /// Display value of `display_field` for each live id found, keyed by [`id_key`].
    async fn find_related(
        &self,
        resource: &ResolvedResource,
        ids: &[Value],
        display_field: &str,
    ) -> Result<HashMap<String, Value>, AppError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }

    /// Release the shared connection pool at shutdown.
    async fn close(&self) {}
}

/// Open the backend chosen by settings. The relational backend gets its tables created first.
pub async fn connect(settings: &Settings, model: &ResolvedModel) -> Result<Arc<dyn Store>, AppError> {
    match settings.storage {
        StorageBackend::Memory => {
            tracing::info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .acquire_timeout(settings.connect_timeout)
                .connect(&settings.database_url)
                .await?;
            tracing::info!("connected to postgres");
            apply_migrations(&pool, model).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}
