//! Load resource descriptors (embedded or from a file) and resolve them for a deployment.

use crate::config::resolved::{
    Deployment, FieldKind, Operation, ReferenceSpec, ResolvedField, ResolvedModel, ResolvedResource, RuleTable,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN: &str = include_str!("../../resources/blogsphere.json");

/// Descriptors for categories, posts, series, users and roles.
pub fn builtin_config() -> Result<ModelConfig, ConfigError> {
    serde_json::from_str(BUILTIN).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read descriptors from a JSON file laid out like `resources/blogsphere.json`.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<ModelConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Build resolved model from descriptors (validates first).
pub fn resolve(config: &ModelConfig, deployment: &Deployment) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let mut resources = Vec::with_capacity(config.resources.len());
    let mut resource_by_path = HashMap::new();

    for res in &config.resources {
        let fields: Vec<ResolvedField> = res.fields.iter().map(|f| resolve_field(f, deployment)).collect();

        let create_rules: RuleTable = res
            .fields
            .iter()
            .map(|f| (f.name.clone(), field_rule(f, deployment)))
            .collect();
        let update_rules: RuleTable = create_rules
            .iter()
            .map(|(name, rule)| {
                let mut rule = rule.clone();
                rule.required = Some(false);
                (name.clone(), rule)
            })
            .collect();
        let validation = HashMap::from([(Operation::Create, create_rules), (Operation::Update, update_rules)]);

        let sensitive_fields = fields.iter().filter(|f| f.sensitive).map(|f| f.name.clone()).collect();
        let resource = ResolvedResource {
            id: res.id.clone(),
            path_segment: res.path_segment.clone(),
            schema_name: config.schema.clone(),
            table_name: res.table.clone(),
            display_name: res.display_name.clone(),
            plural_name: res.plural_name.clone(),
            fields,
            id_strategy: deployment.id_strategy,
            delete_policy: deployment.delete_policy,
            sensitive_fields,
            validation,
            conflict_message: res.conflict_message.clone(),
        };
        resource_by_path.insert(res.path_segment.clone(), resource.clone());
        resources.push(resource);
    }

    Ok(ResolvedModel {
        resources,
        resource_by_path,
    })
}

fn resolve_field(f: &FieldConfig, deployment: &Deployment) -> ResolvedField {
    let kind = match &f.type_ {
        FieldTypeConfig::String { max_length } => FieldKind::String { max_length: *max_length },
        FieldTypeConfig::Text => FieldKind::Text,
        FieldTypeConfig::Enum { values } => FieldKind::Enum(values.clone()),
        FieldTypeConfig::Reference { .. } => FieldKind::Reference,
    };
    let reference = match &f.type_ {
        FieldTypeConfig::Reference { resource } => {
            let fallback = match deployment.reference_fallback {
                Some(overridden) if !f.nullable => overridden,
                _ => f.fallback,
            };
            Some(ReferenceSpec {
                target: resource.clone(),
                display_field: f.display.as_ref().map(|d| d.field.clone()),
                alias: f.display.as_ref().map(|d| d.alias.clone()),
                fallback,
            })
        }
        _ => None,
    };
    ResolvedField {
        name: f.name.clone(),
        kind,
        nullable: f.nullable,
        unique: f.unique,
        sensitive: f.sensitive,
        trim: f.trim,
        lowercase: f.lowercase,
        default: f.default.clone(),
        reference,
    }
}

/// Create-time rule for a field: the descriptor rule plus constraints implied by its type.
fn field_rule(f: &FieldConfig, deployment: &Deployment) -> ValidationRule {
    let mut rule = f.validation.clone();
    match &f.type_ {
        FieldTypeConfig::String { max_length } => {
            rule.max_length = match (rule.max_length, *max_length) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        FieldTypeConfig::Text => {}
        FieldTypeConfig::Enum { values } => {
            if rule.allowed.is_none() {
                rule.allowed = Some(values.iter().cloned().map(Value::String).collect());
            }
        }
        FieldTypeConfig::Reference { .. } => {
            rule.format = Some(deployment.id_strategy.reference_format().into());
        }
    }
    // A non-nullable column never takes an explicit null.
    if !f.nullable {
        rule.nullable = Some(false);
    }
    if f.trim {
        rule.trim = true;
    }
    if f.lowercase {
        rule.lowercase = true;
    }
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeletePolicy, IdStrategy};

    fn model(deployment: Deployment) -> ResolvedModel {
        resolve(&builtin_config().unwrap(), &deployment).unwrap()
    }

    #[test]
    fn resolves_all_five_resources_in_order() {
        let model = model(Deployment::default());
        let paths: Vec<_> = model.resources.iter().map(|r| r.path_segment.as_str()).collect();
        assert_eq!(paths, ["roles", "users", "categories", "series", "posts"]);
        assert!(model.resource_by_path("posts").is_some());
        assert!(model.resource_by_path("comments").is_none());
    }

    #[test]
    fn update_rules_relax_required_only() {
        let model = model(Deployment::default());
        let users = model.resource_by_path("users").unwrap();
        let create = &users.rules(Operation::Create)["username"];
        let update = &users.rules(Operation::Update)["username"];
        assert_eq!(create.required, Some(true));
        assert_eq!(update.required, Some(false));
        assert_eq!(update.format.as_deref(), Some("alphanum"));
        assert_eq!(update.min_length, Some(3));
        assert_eq!(update.max_length, Some(100));
    }

    #[test]
    fn reference_format_follows_id_strategy() {
        let seq = model(Deployment::default());
        let rule = &seq.resource_by_path("posts").unwrap().rules(Operation::Create)["category_id"];
        assert_eq!(rule.format.as_deref(), Some("integer"));

        let uuid = model(Deployment {
            id_strategy: IdStrategy::Uuid,
            delete_policy: DeletePolicy::Soft,
            reference_fallback: None,
        });
        let posts = uuid.resource_by_path("posts").unwrap();
        assert_eq!(posts.rules(Operation::Update)["series_id"].format.as_deref(), Some("uuid"));
        assert_eq!(posts.delete_policy, DeletePolicy::Soft);
    }

    #[test]
    fn enum_values_become_allowed_set() {
        let model = model(Deployment::default());
        let rule = &model.resource_by_path("posts").unwrap().rules(Operation::Create)["status"];
        let allowed: Vec<_> = rule.allowed.as_ref().unwrap().iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(allowed, ["Draft", "Published", "Archived"]);
    }

    #[test]
    fn author_fallback_is_configurable() {
        let default = model(Deployment::default());
        let author = default.resource_by_path("posts").unwrap().field("author_id").unwrap();
        assert_eq!(author.reference.as_ref().unwrap().fallback, ReferenceFallback::MostRecent);

        let strict = model(Deployment {
            reference_fallback: Some(ReferenceFallback::None),
            ..Default::default()
        });
        let posts = strict.resource_by_path("posts").unwrap();
        let author = posts.field("author_id").unwrap();
        assert_eq!(author.reference.as_ref().unwrap().fallback, ReferenceFallback::None);
        // Nullable references keep their own policy.
        let category = posts.field("category_id").unwrap();
        assert_eq!(category.reference.as_ref().unwrap().fallback, ReferenceFallback::None);
    }

    #[test]
    fn sensitive_fields_are_collected() {
        let model = model(Deployment::default());
        let users = model.resource_by_path("users").unwrap();
        assert!(users.sensitive_fields.contains("password"));
        assert_eq!(users.conflict_message(), "Username or email already exists");
        assert_eq!(model.resource_by_path("roles").unwrap().conflict_message(), "Role already exists");
    }
}
