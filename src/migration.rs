//! Create resource tables from the resolved model: schema, tables, unique indexes.
//! Idempotent; safe to run at every startup. References carry no foreign keys: deleting a
//! target leaves referencing rows untouched, as in the in-memory store.

use crate::config::{DeletePolicy, FieldKind, IdStrategy, ResolvedModel, ResolvedResource};
use crate::error::AppError;
use crate::sql::{qualified_table, quoted};
use sqlx::PgPool;

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn id_column(resource: &ResolvedResource) -> &'static str {
    match resource.id_strategy {
        IdStrategy::Sequential => "BIGSERIAL PRIMARY KEY",
        IdStrategy::Uuid => "UUID PRIMARY KEY",
    }
}

fn reference_type(resource: &ResolvedResource) -> &'static str {
    match resource.id_strategy {
        IdStrategy::Sequential => "BIGINT",
        IdStrategy::Uuid => "UUID",
    }
}

/// CREATE TABLE for one resource.
pub fn create_table_sql(resource: &ResolvedResource) -> String {
    let mut col_defs = vec![format!("{} {}", quoted("id"), id_column(resource))];
    for f in &resource.fields {
        let typ = match &f.kind {
            FieldKind::String { max_length: Some(n) } => format!("VARCHAR({})", n),
            FieldKind::String { max_length: None } | FieldKind::Text | FieldKind::Enum(_) => "TEXT".to_string(),
            FieldKind::Reference => reference_type(resource).to_string(),
        };
        let mut def = format!("{} {}", quoted(&f.name), typ);
        if !f.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(d) = &f.default {
            let value = d.as_str().map(literal).unwrap_or_else(|| d.to_string());
            def.push_str(&format!(" DEFAULT {}", value));
        }
        if let FieldKind::Enum(values) = &f.kind {
            let allowed: Vec<String> = values.iter().map(|v| literal(v)).collect();
            def.push_str(&format!(" CHECK ({} IN ({}))", quoted(&f.name), allowed.join(", ")));
        }
        col_defs.push(def);
    }
    col_defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quoted("created_at")));
    col_defs.push(format!("{} TIMESTAMPTZ NOT NULL DEFAULT NOW()", quoted("updated_at")));
    if resource.delete_policy == DeletePolicy::Soft {
        col_defs.push(format!("{} TIMESTAMPTZ", quoted("deleted_at")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(resource),
        col_defs.join(",\n  ")
    )
}

/// Unique indexes (over live rows only under soft delete) and the listing index.
pub fn index_sql(resource: &ResolvedResource) -> Vec<String> {
    let table = qualified_table(resource);
    let live_only = match resource.delete_policy {
        DeletePolicy::Soft => format!(" WHERE {} IS NULL", quoted("deleted_at")),
        DeletePolicy::Hard => String::new(),
    };
    let mut out: Vec<String> = resource
        .unique_fields()
        .map(|f| {
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({}){}",
                quoted(&format!("uq_{}_{}", resource.table_name, f.name)),
                table,
                quoted(&f.name),
                live_only
            )
        })
        .collect();
    out.push(format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({} DESC)",
        quoted(&format!("ix_{}_created_at", resource.table_name)),
        table,
        quoted("created_at")
    ));
    out
}

/// Apply the whole model in descriptor order.
pub async fn apply_migrations(pool: &PgPool, model: &ResolvedModel) -> Result<(), AppError> {
    let mut schemas: Vec<&str> = model.resources.iter().map(|r| r.schema_name.as_str()).collect();
    schemas.dedup();
    for schema in schemas {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)))
            .execute(pool)
            .await?;
    }

    for resource in &model.resources {
        let ddl = create_table_sql(resource);
        tracing::debug!(sql = %ddl, "migrate");
        sqlx::query(&ddl).execute(pool).await?;
        for sql in index_sql(resource) {
            tracing::debug!(sql = %sql, "migrate");
            sqlx::query(&sql).execute(pool).await?;
        }
    }

    tracing::info!(tables = model.resources.len(), "migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_config, resolve, Deployment};

    #[test]
    fn posts_table_ddl() {
        let model = resolve(&builtin_config().unwrap(), &Deployment::default()).unwrap();
        let ddl = create_table_sql(model.resource_by_path("posts").unwrap());
        assert!(ddl.starts_with(r#"CREATE TABLE IF NOT EXISTS "public"."posts""#));
        assert!(ddl.contains(r#""id" BIGSERIAL PRIMARY KEY"#));
        assert!(ddl.contains(r#""title" VARCHAR(300) NOT NULL"#));
        assert!(ddl.contains(r#""author_id" BIGINT NOT NULL"#));
        assert!(ddl.contains(
            r#""status" TEXT NOT NULL DEFAULT 'Draft' CHECK ("status" IN ('Draft', 'Published', 'Archived'))"#
        ));
        assert!(!ddl.contains("deleted_at"));
        assert!(!ddl.contains("REFERENCES"));
    }

    #[test]
    fn soft_delete_uuid_variant() {
        let deployment = Deployment {
            id_strategy: IdStrategy::Uuid,
            delete_policy: DeletePolicy::Soft,
            reference_fallback: None,
        };
        let model = resolve(&builtin_config().unwrap(), &deployment).unwrap();
        let users = model.resource_by_path("users").unwrap();
        let ddl = create_table_sql(users);
        assert!(ddl.contains(r#""id" UUID PRIMARY KEY"#));
        assert!(ddl.contains(r#""role_id" UUID"#));
        assert!(ddl.contains(r#""deleted_at" TIMESTAMPTZ"#));

        let idx = index_sql(users);
        assert_eq!(idx.len(), 3);
        assert!(idx[0].ends_with(r#"("username") WHERE "deleted_at" IS NULL"#));

        assert!(!ddl.contains("REFERENCES"));
    }
}
