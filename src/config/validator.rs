//! Descriptor validation: referential integrity and API consistency.

use crate::config::{FieldTypeConfig, ModelConfig};
use crate::error::ConfigError;
use std::collections::HashSet;

/// Columns every resource carries; descriptors may not redeclare them.
pub const RESERVED_COLUMNS: &[&str] = &["id", "created_at", "updated_at", "deleted_at"];

pub fn validate(config: &ModelConfig) -> Result<(), ConfigError> {
    if config.resources.is_empty() {
        return Err(ConfigError::Validation("at least one resource required".into()));
    }
    let known_paths: HashSet<&str> = config.resources.iter().map(|r| r.path_segment.as_str()).collect();

    let mut path_segments = HashSet::new();
    let mut tables = HashSet::new();
    for res in &config.resources {
        if res.path_segment.is_empty() || res.path_segment.contains('/') {
            return Err(ConfigError::Validation(format!(
                "resource {}: invalid path segment '{}'",
                res.id, res.path_segment
            )));
        }
        if !path_segments.insert(res.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(res.path_segment.clone()));
        }
        if !tables.insert(res.table.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate table: {}", res.table)));
        }

        let mut field_names = HashSet::new();
        for f in &res.fields {
            if RESERVED_COLUMNS.contains(&f.name.as_str()) {
                return Err(ConfigError::ReservedField {
                    resource: res.id.clone(),
                    field: f.name.clone(),
                });
            }
            if !field_names.insert(f.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "resource {}: duplicate field {}",
                    res.id, f.name
                )));
            }
            match &f.type_ {
                FieldTypeConfig::Reference { resource } => {
                    if !known_paths.contains(resource.as_str()) {
                        return Err(ConfigError::MissingReference {
                            kind: "resource",
                            id: resource.clone(),
                        });
                    }
                }
                FieldTypeConfig::Enum { values } => {
                    if values.is_empty() {
                        return Err(ConfigError::Validation(format!(
                            "resource {}: enum field {} has no values",
                            res.id, f.name
                        )));
                    }
                    if let Some(default) = f.default.as_ref().and_then(|d| d.as_str()) {
                        if !values.iter().any(|v| v == default) {
                            return Err(ConfigError::Validation(format!(
                                "resource {}: default '{}' of {} is not one of its values",
                                res.id, default, f.name
                            )));
                        }
                    }
                }
                FieldTypeConfig::String { .. } | FieldTypeConfig::Text => {}
            }
            if f.display.is_some() && !matches!(f.type_, FieldTypeConfig::Reference { .. }) {
                return Err(ConfigError::Validation(format!(
                    "resource {}: display set on non-reference field {}",
                    res.id, f.name
                )));
            }
            if let Some(pattern) = &f.validation.pattern {
                regex::Regex::new(pattern).map_err(|e| {
                    ConfigError::Validation(format!("resource {}: bad pattern for {}: {}", res.id, f.name, e))
                })?;
            }
        }
    }

    // Display fields must exist on the referenced resource.
    for res in &config.resources {
        for f in &res.fields {
            let (FieldTypeConfig::Reference { resource }, Some(display)) = (&f.type_, &f.display) else {
                continue;
            };
            let target = config.resources.iter().find(|r| &r.path_segment == resource);
            let has_field = target
                .map(|t| t.fields.iter().any(|tf| tf.name == display.field))
                .unwrap_or(false);
            if !has_field {
                return Err(ConfigError::MissingReference {
                    kind: "display field",
                    id: format!("{}.{}", resource, display.field),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::builtin_config;

    #[test]
    fn builtin_descriptors_are_valid() {
        let config = builtin_config().unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn rejects_unknown_reference_target() {
        let mut config = builtin_config().unwrap();
        let posts = config.resources.iter_mut().find(|r| r.path_segment == "posts").unwrap();
        let author = posts.fields.iter_mut().find(|f| f.name == "author_id").unwrap();
        author.type_ = FieldTypeConfig::Reference { resource: "people".into() };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::MissingReference { kind: "resource", .. })
        ));
    }

    #[test]
    fn rejects_reserved_and_duplicate_segments() {
        let mut config = builtin_config().unwrap();
        config.resources[0].fields[0].name = "created_at".into();
        assert!(matches!(validate(&config), Err(ConfigError::ReservedField { .. })));

        let mut config = builtin_config().unwrap();
        config.resources[1].path_segment = config.resources[0].path_segment.clone();
        config.resources[1].table = "other".into();
        assert!(matches!(validate(&config), Err(ConfigError::DuplicatePathSegment(_))));
    }
}
