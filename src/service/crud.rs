//! Generic CRUD over one resource descriptor and a storage backend.

use crate::config::{DeletePolicy, Operation, ReferenceFallback, ReferenceSpec, ResolvedField, ResolvedModel, ResolvedResource};
use crate::error::{AppError, ConfigError};
use crate::store::{id_key, now_timestamp, Record, Scope, Store};
use serde_json::Value;
use std::collections::HashMap;

/// Every resource goes through the same engine; the descriptor supplies fields, uniqueness,
/// references and the deployment's identity and delete policies.
pub struct CrudService<'a> {
    store: &'a dyn Store,
    model: &'a ResolvedModel,
    resource: &'a ResolvedResource,
}

impl<'a> CrudService<'a> {
    pub fn new(store: &'a dyn Store, model: &'a ResolvedModel, resource: &'a ResolvedResource) -> Self {
        CrudService { store, model, resource }
    }

    /// All live records, newest first, with reference names inlined.
    pub async fn list(&self) -> Result<Vec<Value>, AppError> {
        let rows = self.store.find(self.resource).await?;
        self.present(rows).await
    }

    pub async fn read(&self, id: &Value) -> Result<Value, AppError> {
        let row = self
            .store
            .find_by_id(self.resource, id, Scope::Live)
            .await?
            .ok_or_else(|| self.not_found())?;
        self.present_one(row).await
    }

    /// Raw stored record including soft-deleted ones. Not exposed over HTTP.
    pub async fn read_any(&self, id: &Value) -> Result<Option<Record>, AppError> {
        self.store.find_by_id(self.resource, id, Scope::All).await
    }

    /// Persist validated fields: defaults, reference checks and fallbacks, identity, timestamps.
    pub async fn create(&self, mut fields: Record) -> Result<Value, AppError> {
        for f in &self.resource.fields {
            if let Some(default) = &f.default {
                fields.entry(f.name.clone()).or_insert_with(|| default.clone());
            }
        }
        self.resolve_references(&mut fields, Operation::Create).await?;

        if let Some(id) = self.resource.id_strategy.assign() {
            fields.insert("id".into(), id);
        }
        let now = now_timestamp();
        fields.insert("created_at".into(), now.clone());
        fields.insert("updated_at".into(), now);

        let id = self
            .store
            .insert(self.resource, fields)
            .await
            .map_err(|e| self.conflict(e))?;
        tracing::debug!(resource = %self.resource.path_segment, id = %id_key(&id), "created");
        self.read(&id).await
    }

    /// Merge the fields present onto the record; omitted fields stay untouched, explicit
    /// nulls clear the column.
    pub async fn update(&self, id: &Value, mut fields: Record) -> Result<Value, AppError> {
        if self.store.find_by_id(self.resource, id, Scope::Live).await?.is_none() {
            return Err(self.not_found());
        }
        self.resolve_references(&mut fields, Operation::Update).await?;
        fields.insert("updated_at".into(), now_timestamp());

        let updated = self
            .store
            .update(self.resource, id, fields)
            .await
            .map_err(|e| self.conflict(e))?;
        if !updated {
            return Err(self.not_found());
        }
        self.read(id).await
    }

    pub async fn delete(&self, id: &Value) -> Result<(), AppError> {
        if !self.store.delete(self.resource, id).await? {
            return Err(self.not_found());
        }
        tracing::debug!(resource = %self.resource.path_segment, id = %id_key(id), "deleted");
        Ok(())
    }

    fn not_found(&self) -> AppError {
        AppError::NotFound(format!("{} not found", self.resource.display_name))
    }

    /// Backend conflict detail is replaced with the resource's conflict message.
    fn conflict(&self, e: AppError) -> AppError {
        match e {
            AppError::DuplicateKey(constraint) => {
                tracing::debug!(constraint = %constraint, "duplicate key");
                AppError::DuplicateKey(self.resource.conflict_message())
            }
            other => other,
        }
    }

    fn target(&self, spec: &ReferenceSpec) -> Result<&'a ResolvedResource, AppError> {
        self.model.resource_by_path(&spec.target).ok_or_else(|| {
            AppError::Config(ConfigError::MissingReference {
                kind: "resource",
                id: spec.target.clone(),
            })
        })
    }

    /// Supplied references must point at live records. On create, an absent non-nullable
    /// reference is filled by its fallback policy or rejected.
    async fn resolve_references(&self, fields: &mut Record, op: Operation) -> Result<(), AppError> {
        for (field, spec) in self.resource.references() {
            let target = self.target(spec)?;
            match fields.get(&field.name) {
                Some(Value::Null) => {}
                Some(id) => {
                    if self.store.find_by_id(target, id, Scope::Live).await?.is_none() {
                        return Err(AppError::PreconditionFailed(format!(
                            "{} {} does not exist",
                            target.display_name,
                            id_key(id)
                        )));
                    }
                }
                None if op == Operation::Create && !field.nullable => {
                    let id = self.fallback(field, spec, target).await?;
                    fields.insert(field.name.clone(), id);
                }
                None => {}
            }
        }
        Ok(())
    }

    async fn fallback(
        &self,
        field: &ResolvedField,
        spec: &ReferenceSpec,
        target: &ResolvedResource,
    ) -> Result<Value, AppError> {
        match spec.fallback {
            ReferenceFallback::MostRecent => {
                let newest = self.store.find_first(target).await?;
                newest.and_then(|r| r.get("id").cloned()).ok_or_else(|| {
                    AppError::PreconditionFailed(format!(
                        "No {} found. Please create a {} first.",
                        target.plural_name.to_lowercase(),
                        target.display_name.to_lowercase()
                    ))
                })
            }
            ReferenceFallback::None => Err(AppError::Validation(vec![format!(
                "\"{}\" is required",
                field.name
            )])),
        }
    }

    async fn present_one(&self, row: Record) -> Result<Value, AppError> {
        let mut out = self.present(vec![row]).await?;
        out.pop().ok_or(AppError::Internal)
    }

    /// Read-time join: inline each reference's display value under its alias, fill absent
    /// columns with null and strip sensitive fields.
    async fn present(&self, mut rows: Vec<Record>) -> Result<Vec<Value>, AppError> {
        for (field, spec) in self.resource.references() {
            let (Some(display_field), Some(alias)) = (&spec.display_field, &spec.alias) else {
                continue;
            };
            let target = self.target(spec)?;
            let mut ids: Vec<Value> = rows
                .iter()
                .filter_map(|r| r.get(&field.name))
                .filter(|v| !v.is_null())
                .cloned()
                .collect();
            ids.sort_by_key(id_key);
            ids.dedup();
            let names: HashMap<String, Value> = if ids.is_empty() {
                HashMap::new()
            } else {
                self.store.find_related(target, &ids, display_field).await?
            };
            for row in rows.iter_mut() {
                let name = row
                    .get(&field.name)
                    .and_then(|id| names.get(&id_key(id)))
                    .cloned()
                    .unwrap_or(Value::Null);
                row.insert(alias.clone(), name);
            }
        }

        Ok(rows
            .into_iter()
            .map(|mut row| {
                for f in &self.resource.fields {
                    row.entry(f.name.clone()).or_insert(Value::Null);
                }
                if self.resource.delete_policy == DeletePolicy::Soft {
                    row.entry("deleted_at").or_insert(Value::Null);
                }
                for s in &self.resource.sensitive_fields {
                    row.remove(s);
                }
                Value::Object(row)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_config, resolve, DeletePolicy, Deployment, IdStrategy};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn model(deployment: Deployment) -> ResolvedModel {
        resolve(&builtin_config().unwrap(), &deployment).unwrap()
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    fn service<'a>(store: &'a MemoryStore, model: &'a ResolvedModel, path: &str) -> CrudService<'a> {
        CrudService::new(store, model, model.resource_by_path(path).unwrap())
    }

    async fn create_user(store: &MemoryStore, model: &ResolvedModel, name: &str) -> Value {
        service(store, model, "users")
            .create(record(json!({
                "username": name,
                "email": format!("{}@example.com", name),
                "password": "secret1"
            })))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let categories = service(&store, &model, "categories");
        let created = categories
            .create(record(json!({"name": "Rust", "description": "Systems"})))
            .await
            .unwrap();
        assert_eq!(created["id"], json!(1));
        assert_eq!(created["name"], json!("Rust"));
        assert_eq!(created["description"], json!("Systems"));
        assert!(created["created_at"].is_string());
        assert_eq!(created["created_at"], created["updated_at"]);

        let fetched = categories.read(&json!(1)).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn partial_update_leaves_other_fields() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        create_user(&store, &model, "alice").await;
        let posts = service(&store, &model, "posts");
        let post = posts
            .create(record(json!({"title": "First post", "content": "Hello"})))
            .await
            .unwrap();
        assert_eq!(post["status"], json!("Draft"));

        let updated = posts
            .update(&post["id"], record(json!({"title": "X marks it"})))
            .await
            .unwrap();
        assert_eq!(updated["title"], json!("X marks it"));
        assert_eq!(updated["content"], json!("Hello"));
        assert_eq!(updated["status"], json!("Draft"));
        assert_eq!(updated["author_id"], post["author_id"]);
        assert_eq!(updated["created_at"], post["created_at"]);
    }

    #[tokio::test]
    async fn update_distinguishes_null_from_omitted() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let categories = service(&store, &model, "categories");
        let c = categories
            .create(record(json!({"name": "Rust", "description": "Systems"})))
            .await
            .unwrap();
        let same = categories.update(&c["id"], record(json!({"name": "Rust!"}))).await.unwrap();
        assert_eq!(same["description"], json!("Systems"));
        let cleared = categories
            .update(&c["id"], record(json!({"description": null})))
            .await
            .unwrap();
        assert_eq!(cleared["description"], Value::Null);
        assert_eq!(cleared["name"], json!("Rust!"));
    }

    #[tokio::test]
    async fn missing_targets_are_not_found() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let roles = service(&store, &model, "roles");
        assert!(matches!(roles.read(&json!(9)).await, Err(AppError::NotFound(m)) if m == "Role not found"));
        assert!(matches!(
            roles.update(&json!(9), record(json!({"name": "nobody"}))).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(roles.delete(&json!(9)).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_twice_is_not_found() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let roles = service(&store, &model, "roles");
        let role = roles.create(record(json!({"name": "admin"}))).await.unwrap();
        roles.delete(&role["id"]).await.unwrap();
        assert!(matches!(roles.delete(&role["id"]).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn duplicate_username_keeps_first_record() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let first = create_user(&store, &model, "admin").await;
        let err = service(&store, &model, "users")
            .create(record(json!({
                "username": "admin",
                "email": "other@example.com",
                "password": "secret1"
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DuplicateKey(ref m) if m == "Username or email already exists"));

        let kept = service(&store, &model, "users").read(&first["id"]).await.unwrap();
        assert_eq!(kept["email"], json!("admin@example.com"));
        assert_eq!(service(&store, &model, "users").list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn post_needs_an_author() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let posts = service(&store, &model, "posts");
        let payload = record(json!({"title": "Hello world", "content": "Body"}));
        let err = posts.create(payload.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::PreconditionFailed(ref m) if m == "No users found. Please create a user first."
        ));

        create_user(&store, &model, "alice").await;
        let bob = create_user(&store, &model, "bob").await;
        let post = posts.create(payload).await.unwrap();
        assert_eq!(post["author_id"], bob["id"]);
        assert_eq!(post["author_name"], json!("bob"));
    }

    #[tokio::test]
    async fn explicit_author_and_strict_fallback() {
        let model = model(Deployment {
            reference_fallback: Some(ReferenceFallback::None),
            ..Default::default()
        });
        let store = MemoryStore::new();
        let alice = create_user(&store, &model, "alice").await;
        let posts = service(&store, &model, "posts");

        let err = posts
            .create(record(json!({"title": "Hello world", "content": "Body"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref d) if d == &vec!["\"author_id\" is required".to_string()]));

        let post = posts
            .create(record(json!({"title": "Hello world", "content": "Body", "author_id": alice["id"]})))
            .await
            .unwrap();
        assert_eq!(post["author_name"], json!("alice"));
    }

    #[tokio::test]
    async fn unknown_reference_is_a_precondition_failure() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        create_user(&store, &model, "alice").await;
        let err = service(&store, &model, "posts")
            .create(record(json!({"title": "Hello world", "content": "Body", "category_id": 9})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PreconditionFailed(ref m) if m == "Category 9 does not exist"));
    }

    #[tokio::test]
    async fn list_inlines_names_and_hides_sensitive_fields() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let role = service(&store, &model, "roles")
            .create(record(json!({"name": "editor"})))
            .await
            .unwrap();
        service(&store, &model, "users")
            .create(record(json!({
                "username": "carol",
                "email": "carol@example.com",
                "password": "secret1",
                "role_id": role["id"]
            })))
            .await
            .unwrap();
        let users = service(&store, &model, "users").list().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["role_name"], json!("editor"));
        assert!(users[0].get("password").is_none());

        // Renaming the role shows up on the next read: the join is not denormalized.
        service(&store, &model, "roles")
            .update(&role["id"], record(json!({"name": "writer"})))
            .await
            .unwrap();
        let users = service(&store, &model, "users").list().await.unwrap();
        assert_eq!(users[0]["role_name"], json!("writer"));
    }

    #[tokio::test]
    async fn soft_delete_keeps_record_for_internal_access() {
        let model = model(Deployment {
            id_strategy: IdStrategy::Uuid,
            delete_policy: DeletePolicy::Soft,
            reference_fallback: None,
        });
        let store = MemoryStore::new();
        let series = service(&store, &model, "series");
        let s = series.create(record(json!({"name": "Async Rust"}))).await.unwrap();
        assert!(uuid::Uuid::parse_str(s["id"].as_str().unwrap()).is_ok());
        assert_eq!(s["status"], json!("Active"));

        series.delete(&s["id"]).await.unwrap();
        assert!(series.list().await.unwrap().is_empty());
        assert!(matches!(series.read(&s["id"]).await, Err(AppError::NotFound(_))));
        let raw = series.read_any(&s["id"]).await.unwrap().unwrap();
        assert!(raw["deleted_at"].is_string());
    }

    #[tokio::test]
    async fn deleting_a_referenced_record_leaves_referrers_in_place() {
        let model = model(Deployment::default());
        let store = MemoryStore::new();
        let alice = create_user(&store, &model, "alice").await;
        let posts = service(&store, &model, "posts");
        let post = posts
            .create(record(json!({"title": "Hello world", "content": "Body"})))
            .await
            .unwrap();

        service(&store, &model, "users").delete(&alice["id"]).await.unwrap();
        let kept = posts.read(&post["id"]).await.unwrap();
        assert_eq!(kept["author_id"], alice["id"]);
        assert_eq!(kept["author_name"], Value::Null);
    }
}
