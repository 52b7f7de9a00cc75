//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a resolved resource.

use crate::config::{DeletePolicy, FieldKind, IdStrategy, ResolvedResource};
use crate::store::Scope;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from descriptors).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(resource: &ResolvedResource) -> String {
    format!("{}.{}", quoted(&resource.schema_name), quoted(&resource.table_name))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Push a value and return its placeholder, cast to the column type when it has one.
    fn placeholder(&mut self, v: Value, cast: Option<&str>) -> String {
        let n = self.push_param(v);
        match cast {
            Some(t) => format!("${}::{}", n, t),
            None => format!("${}", n),
        }
    }
}

fn id_type(resource: &ResolvedResource) -> &'static str {
    match resource.id_strategy {
        IdStrategy::Sequential => "bigint",
        IdStrategy::Uuid => "uuid",
    }
}

/// Cast applied to placeholders of `column`; text columns need none.
pub fn column_cast(resource: &ResolvedResource, column: &str) -> Option<&'static str> {
    match column {
        "id" => Some(id_type(resource)),
        "created_at" | "updated_at" | "deleted_at" => Some("timestamptz"),
        _ => match resource.field(column).map(|f| &f.kind) {
            Some(FieldKind::Reference) => Some(id_type(resource)),
            _ => None,
        },
    }
}

/// Every stored column in declaration order: id, descriptor fields, timestamps.
pub fn column_names(resource: &ResolvedResource) -> Vec<&str> {
    let mut cols = vec!["id"];
    cols.extend(resource.fields.iter().map(|f| f.name.as_str()));
    cols.push("created_at");
    cols.push("updated_at");
    if resource.delete_policy == DeletePolicy::Soft {
        cols.push("deleted_at");
    }
    cols
}

fn select_column_list(resource: &ResolvedResource) -> String {
    column_names(resource)
        .into_iter()
        .map(quoted)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `deleted_at IS NULL` when the scope only sees live rows of a soft-delete deployment.
fn live_filter(resource: &ResolvedResource, scope: Scope) -> Option<String> {
    match (resource.delete_policy, scope) {
        (DeletePolicy::Soft, Scope::Live) => Some(format!("{} IS NULL", quoted("deleted_at"))),
        _ => None,
    }
}

fn newest_first() -> String {
    format!(" ORDER BY {} DESC, {} DESC", quoted("created_at"), quoted("id"))
}

/// SELECT every live row, newest first.
pub fn select_list(resource: &ResolvedResource) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = live_filter(resource, Scope::Live)
        .map(|f| format!(" WHERE {}", f))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}",
        select_column_list(resource),
        qualified_table(resource),
        where_clause,
        newest_first()
    );
    q
}

/// SELECT the newest live row.
pub fn select_first(resource: &ResolvedResource) -> QueryBuf {
    let mut q = select_list(resource);
    q.sql.push_str(" LIMIT 1");
    q
}

/// SELECT by primary key.
pub fn select_by_id(resource: &ResolvedResource, id: &Value, scope: Scope) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(id.clone(), Some(id_type(resource)));
    let mut where_parts = vec![format!("{} = {}", quoted("id"), ph)];
    where_parts.extend(live_filter(resource, scope));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {}",
        select_column_list(resource),
        qualified_table(resource),
        where_parts.join(" AND ")
    );
    q
}

/// SELECT id, display column of live rows whose id is in `ids`.
pub fn select_display(resource: &ResolvedResource, display_field: &str, ids: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(resource);
    let cols = format!("{}, {}", quoted("id"), quoted(display_field));
    if ids.is_empty() {
        q.sql = format!("SELECT {} FROM {} WHERE 1 = 0", cols, table);
        return q;
    }
    let placeholders: Vec<String> = ids
        .iter()
        .map(|v| q.placeholder(v.clone(), Some(id_type(resource))))
        .collect();
    let mut where_parts = vec![format!("{} IN ({})", quoted("id"), placeholders.join(", "))];
    where_parts.extend(live_filter(resource, Scope::Live));
    q.sql = format!("SELECT {} FROM {} WHERE {}", cols, table, where_parts.join(" AND "));
    q
}

/// INSERT the known columns present in `fields`; returns the id.
/// Omitting `id` lets BIGSERIAL assign it.
pub fn insert(resource: &ResolvedResource, fields: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for name in column_names(resource) {
        let Some(val) = fields.get(name) else { continue };
        placeholders.push(q.placeholder(val.clone(), column_cast(resource, name)));
        cols.push(quoted(name));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        qualified_table(resource),
        cols.join(", "),
        placeholders.join(", "),
        quoted("id")
    );
    q
}

/// UPDATE by id: SET only known columns present in `fields` (never `id`).
pub fn update(resource: &ResolvedResource, id: &Value, fields: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for name in column_names(resource) {
        if name == "id" {
            continue;
        }
        let Some(val) = fields.get(name) else { continue };
        let rhs = q.placeholder(val.clone(), column_cast(resource, name));
        sets.push(format!("{} = {}", quoted(name), rhs));
    }
    if sets.is_empty() {
        sets.push(format!("{} = NOW()", quoted("updated_at")));
    }
    let id_ph = q.placeholder(id.clone(), Some(id_type(resource)));
    let mut where_parts = vec![format!("{} = {}", quoted("id"), id_ph)];
    where_parts.extend(live_filter(resource, Scope::Live));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} RETURNING {}",
        qualified_table(resource),
        sets.join(", "),
        where_parts.join(" AND "),
        quoted("id")
    );
    q
}

/// DELETE by id, or stamp `deleted_at` under the soft policy.
pub fn delete(resource: &ResolvedResource, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(resource);
    let ph = q.placeholder(id.clone(), Some(id_type(resource)));
    q.sql = match resource.delete_policy {
        DeletePolicy::Hard => format!(
            "DELETE FROM {} WHERE {} = {} RETURNING {}",
            table,
            quoted("id"),
            ph,
            quoted("id")
        ),
        DeletePolicy::Soft => format!(
            "UPDATE {} SET {} = NOW(), {} = NOW() WHERE {} = {} AND {} IS NULL RETURNING {}",
            table,
            quoted("deleted_at"),
            quoted("updated_at"),
            quoted("id"),
            ph,
            quoted("deleted_at"),
            quoted("id")
        ),
    };
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_config, resolve, Deployment, ResolvedModel};
    use serde_json::json;

    fn model(delete_policy: DeletePolicy) -> ResolvedModel {
        let deployment = Deployment {
            delete_policy,
            ..Default::default()
        };
        resolve(&builtin_config().unwrap(), &deployment).unwrap()
    }

    #[test]
    fn list_orders_newest_first_and_hides_soft_deleted() {
        let hard = model(DeletePolicy::Hard);
        let q = select_list(hard.resource_by_path("roles").unwrap());
        assert_eq!(
            q.sql,
            r#"SELECT "id", "name", "description", "created_at", "updated_at" FROM "public"."roles" ORDER BY "created_at" DESC, "id" DESC"#
        );

        let soft = model(DeletePolicy::Soft);
        let q = select_list(soft.resource_by_path("roles").unwrap());
        assert!(q.sql.contains(r#"WHERE "deleted_at" IS NULL ORDER BY"#));
        assert!(q.sql.contains(r#""deleted_at" FROM"#));
    }

    #[test]
    fn select_by_id_scope() {
        let soft = model(DeletePolicy::Soft);
        let roles = soft.resource_by_path("roles").unwrap();
        let live = select_by_id(roles, &json!(4), Scope::Live);
        assert!(live.sql.ends_with(r#"WHERE "id" = $1::bigint AND "deleted_at" IS NULL"#));
        assert_eq!(live.params, vec![json!(4)]);
        let all = select_by_id(roles, &json!(4), Scope::All);
        assert!(all.sql.ends_with(r#"WHERE "id" = $1::bigint"#));
    }

    #[test]
    fn insert_casts_references_and_timestamps() {
        let model = model(DeletePolicy::Hard);
        let posts = model.resource_by_path("posts").unwrap();
        let fields = json!({
            "title": "Hello world",
            "content": "body",
            "author_id": 1,
            "status": "Draft",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let q = insert(posts, fields.as_object().unwrap());
        assert_eq!(
            q.sql,
            r#"INSERT INTO "public"."posts" ("title", "content", "author_id", "status", "created_at", "updated_at") VALUES ($1, $2, $3::bigint, $4, $5::timestamptz, $6::timestamptz) RETURNING "id""#
        );
        assert_eq!(q.params.len(), 6);
    }

    #[test]
    fn update_sets_only_present_columns() {
        let model = model(DeletePolicy::Hard);
        let posts = model.resource_by_path("posts").unwrap();
        let fields = json!({"title": "New title", "series_id": null, "id": 99, "bogus": 1});
        let q = update(posts, &json!(3), fields.as_object().unwrap());
        assert_eq!(
            q.sql,
            r#"UPDATE "public"."posts" SET "title" = $1, "series_id" = $2::bigint WHERE "id" = $3::bigint RETURNING "id""#
        );
        assert_eq!(q.params, vec![json!("New title"), Value::Null, json!(3)]);
    }

    #[test]
    fn delete_follows_policy() {
        let hard = model(DeletePolicy::Hard);
        let q = delete(hard.resource_by_path("users").unwrap(), &json!(1));
        assert!(q.sql.starts_with(r#"DELETE FROM "public"."users""#));

        let soft = model(DeletePolicy::Soft);
        let q = delete(soft.resource_by_path("users").unwrap(), &json!(1));
        assert!(q.sql.starts_with(r#"UPDATE "public"."users" SET "deleted_at" = NOW()"#));
        assert!(q.sql.contains(r#"AND "deleted_at" IS NULL"#));
    }

    #[test]
    fn display_lookup_with_no_ids_matches_nothing() {
        let model = model(DeletePolicy::Hard);
        let users = model.resource_by_path("users").unwrap();
        let q = select_display(users, "username", &[]);
        assert!(q.sql.ends_with("WHERE 1 = 0"));
        let q = select_display(users, "username", &[json!(1), json!(2)]);
        assert!(q.sql.ends_with(r#"WHERE "id" IN ($1::bigint, $2::bigint)"#));
    }
}
