//! In-process document store. Each resource is a table of JSON records behind one lock;
//! sequential ids come from a per-table counter bumped under the write lock.

use super::{id_key, now_timestamp, Record, Scope, Store};
use crate::config::{DeletePolicy, ResolvedResource};
use crate::error::AppError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Table {
    next_id: i64,
    next_seq: u64,
    rows: Vec<Row>,
}

struct Row {
    /// Insertion order; breaks ties between equal `created_at` values.
    seq: u64,
    record: Record,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_live(resource: &ResolvedResource, record: &Record) -> bool {
    match resource.delete_policy {
        DeletePolicy::Hard => true,
        DeletePolicy::Soft => record.get("deleted_at").map_or(true, Value::is_null),
    }
}

fn visible(resource: &ResolvedResource, record: &Record, scope: Scope) -> bool {
    scope == Scope::All || is_live(resource, record)
}

fn created_at(record: &Record) -> &str {
    record.get("created_at").and_then(Value::as_str).unwrap_or("")
}

fn newest_first(a: &Row, b: &Row) -> Ordering {
    created_at(&b.record)
        .cmp(created_at(&a.record))
        .then(b.seq.cmp(&a.seq))
}

impl Table {
    fn position(&self, resource: &ResolvedResource, id: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.record.get("id") == Some(id) && is_live(resource, &r.record))
    }

    /// First unique field of `fields` already held by another live row.
    fn conflict(&self, resource: &ResolvedResource, fields: &Record, skip: Option<usize>) -> Option<String> {
        for field in resource.unique_fields() {
            let Some(value) = fields.get(&field.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let taken = self.rows.iter().enumerate().any(|(i, r)| {
                Some(i) != skip && is_live(resource, &r.record) && r.record.get(&field.name) == Some(value)
            });
            if taken {
                return Some(format!("{}.{}", resource.table_name, field.name));
            }
        }
        None
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, resource: &ResolvedResource) -> Result<Vec<Record>, AppError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&resource.table_name) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<&Row> = table.rows.iter().filter(|r| is_live(resource, &r.record)).collect();
        rows.sort_by(|a, b| newest_first(a, b));
        Ok(rows.into_iter().map(|r| r.record.clone()).collect())
    }

    async fn find_by_id(
        &self,
        resource: &ResolvedResource,
        id: &Value,
        scope: Scope,
    ) -> Result<Option<Record>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.get(&resource.table_name).and_then(|t| {
            t.rows
                .iter()
                .find(|r| r.record.get("id") == Some(id) && visible(resource, &r.record, scope))
                .map(|r| r.record.clone())
        }))
    }

    async fn insert(&self, resource: &ResolvedResource, mut fields: Record) -> Result<Value, AppError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(resource.table_name.clone()).or_default();

        if let Some(constraint) = table.conflict(resource, &fields, None) {
            return Err(AppError::DuplicateKey(constraint));
        }
        let id = match fields.get("id") {
            Some(id) if !id.is_null() => {
                if table.rows.iter().any(|r| r.record.get("id") == Some(id)) {
                    return Err(AppError::DuplicateKey(format!("{}.id", resource.table_name)));
                }
                id.clone()
            }
            _ => {
                table.next_id += 1;
                Value::Number(table.next_id.into())
            }
        };
        fields.insert("id".into(), id.clone());
        table.next_seq += 1;
        let seq = table.next_seq;
        table.rows.push(Row { seq, record: fields });
        tracing::debug!(table = %resource.table_name, id = %id_key(&id), "insert");
        Ok(id)
    }

    async fn update(&self, resource: &ResolvedResource, id: &Value, fields: Record) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&resource.table_name) else {
            return Ok(false);
        };
        let Some(pos) = table.position(resource, id) else {
            return Ok(false);
        };
        if let Some(constraint) = table.conflict(resource, &fields, Some(pos)) {
            return Err(AppError::DuplicateKey(constraint));
        }
        let record = &mut table.rows[pos].record;
        for (k, v) in fields {
            if k != "id" {
                record.insert(k, v);
            }
        }
        tracing::debug!(table = %resource.table_name, id = %id_key(id), "update");
        Ok(true)
    }

    async fn delete(&self, resource: &ResolvedResource, id: &Value) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&resource.table_name) else {
            return Ok(false);
        };
        let Some(pos) = table.position(resource, id) else {
            return Ok(false);
        };
        match resource.delete_policy {
            DeletePolicy::Hard => {
                table.rows.remove(pos);
            }
            DeletePolicy::Soft => {
                let now = now_timestamp();
                let record = &mut table.rows[pos].record;
                record.insert("deleted_at".into(), now.clone());
                record.insert("updated_at".into(), now);
            }
        }
        tracing::debug!(table = %resource.table_name, id = %id_key(id), "delete");
        Ok(true)
    }

    async fn find_related(
        &self,
        resource: &ResolvedResource,
        ids: &[Value],
        display_field: &str,
    ) -> Result<HashMap<String, Value>, AppError> {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&resource.table_name) else {
            return Ok(HashMap::new());
        };
        let mut out = HashMap::new();
        for row in table.rows.iter().filter(|r| is_live(resource, &r.record)) {
            let Some(id) = row.record.get("id") else { continue };
            if ids.contains(id) {
                let display = row.record.get(display_field).cloned().unwrap_or(Value::Null);
                out.insert(id_key(id), display);
            }
        }
        Ok(out)
    }
}
