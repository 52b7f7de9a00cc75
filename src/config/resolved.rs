//! Resolved resource model: descriptors validated and flattened for runtime use.

use crate::config::{ReferenceFallback, ValidationRule};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Identity generation, fixed once per deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdStrategy {
    /// Integer surrogate keys assigned by the backend (BIGSERIAL or a counter under the table lock).
    #[default]
    Sequential,
    /// Random v4 UUIDs assigned before insert.
    Uuid,
}

impl IdStrategy {
    /// Identity to send with an insert. `None` lets the backend assign it.
    pub fn assign(&self) -> Option<Value> {
        match self {
            IdStrategy::Sequential => None,
            IdStrategy::Uuid => Some(Value::String(uuid::Uuid::new_v4().to_string())),
        }
    }

    /// Parse an identity from a path segment or payload string.
    pub fn parse_id(&self, s: &str) -> Option<Value> {
        match self {
            IdStrategy::Sequential => s.trim().parse::<i64>().ok().map(|n| Value::Number(n.into())),
            IdStrategy::Uuid => uuid::Uuid::parse_str(s.trim()).ok().map(|u| Value::String(u.to_string())),
        }
    }

    /// Format constraint applied to reference fields.
    pub fn reference_format(&self) -> &'static str {
        match self {
            IdStrategy::Sequential => "integer",
            IdStrategy::Uuid => "uuid",
        }
    }
}

impl std::str::FromStr for IdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "serial" | "integer" => Ok(IdStrategy::Sequential),
            "uuid" => Ok(IdStrategy::Uuid),
            _ => Err(format!("invalid id strategy: {} (expected sequential or uuid)", s)),
        }
    }
}

/// Physical or logical removal, fixed once per deployment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletePolicy {
    #[default]
    Hard,
    /// Set `deleted_at`; the record stays but leaves every live query.
    Soft,
}

impl std::str::FromStr for DeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hard" => Ok(DeletePolicy::Hard),
            "soft" => Ok(DeletePolicy::Soft),
            _ => Err(format!("invalid delete policy: {} (expected hard or soft)", s)),
        }
    }
}

/// Deployment-wide choices applied while resolving descriptors.
#[derive(Clone, Debug, Default)]
pub struct Deployment {
    pub id_strategy: IdStrategy,
    pub delete_policy: DeletePolicy,
    /// Overrides the descriptor fallback of every non-nullable reference when set.
    pub reference_fallback: Option<ReferenceFallback>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
}

/// Rules for one (resource, operation) pair, keyed by field name.
pub type RuleTable = BTreeMap<String, ValidationRule>;

#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    String { max_length: Option<u32> },
    Text,
    Enum(Vec<String>),
    Reference,
}

#[derive(Clone, Debug)]
pub struct ReferenceSpec {
    /// Path segment of the referenced resource.
    pub target: String,
    pub display_field: Option<String>,
    pub alias: Option<String>,
    pub fallback: ReferenceFallback,
}

#[derive(Clone, Debug)]
pub struct ResolvedField {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub unique: bool,
    pub sensitive: bool,
    pub trim: bool,
    pub lowercase: bool,
    pub default: Option<Value>,
    pub reference: Option<ReferenceSpec>,
}

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub id: String,
    pub path_segment: String,
    pub schema_name: String,
    pub table_name: String,
    pub display_name: String,
    pub plural_name: String,
    pub fields: Vec<ResolvedField>,
    pub id_strategy: IdStrategy,
    pub delete_policy: DeletePolicy,
    /// Field names to strip from all API responses.
    pub sensitive_fields: HashSet<String>,
    pub validation: HashMap<Operation, RuleTable>,
    pub conflict_message: Option<String>,
}

impl ResolvedResource {
    pub fn field(&self, name: &str) -> Option<&ResolvedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &ResolvedField> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn references(&self) -> impl Iterator<Item = (&ResolvedField, &ReferenceSpec)> {
        self.fields.iter().filter_map(|f| f.reference.as_ref().map(|r| (f, r)))
    }

    pub fn rules(&self, op: Operation) -> &RuleTable {
        static EMPTY: RuleTable = RuleTable::new();
        self.validation.get(&op).unwrap_or(&EMPTY)
    }

    pub fn conflict_message(&self) -> String {
        self.conflict_message
            .clone()
            .unwrap_or_else(|| format!("{} already exists", self.display_name))
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub resources: Vec<ResolvedResource>,
    pub resource_by_path: HashMap<String, ResolvedResource>,
}

impl ResolvedModel {
    pub fn resource_by_path(&self, path: &str) -> Option<&ResolvedResource> {
        self.resource_by_path.get(path)
    }
}
