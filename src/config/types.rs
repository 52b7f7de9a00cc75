//! Raw resource descriptor types matching `resources/blogsphere.json`.

use serde::{Deserialize, Deserializer, Serialize};

/// Storage/validation type of a field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum FieldTypeConfig {
    /// Bounded string (VARCHAR). Unbounded when `max_length` is omitted.
    String {
        #[serde(default)]
        max_length: Option<u32>,
    },
    Text,
    Enum { values: Vec<String> },
    /// Identity of a record in another resource, addressed by its path segment.
    Reference { resource: String },
}

/// How a reference that is absent from a create payload gets filled in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFallback {
    /// Leave it absent; a non-nullable reference then fails the create.
    #[default]
    None,
    /// Use the most recently created record of the referenced resource.
    MostRecent,
}

impl std::str::FromStr for ReferenceFallback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(ReferenceFallback::None),
            "most_recent" | "most-recent" => Ok(ReferenceFallback::MostRecent),
            _ => Err(format!("invalid reference fallback: {} (expected none or most_recent)", s)),
        }
    }
}

/// Display column of a referenced resource, inlined into responses under `alias`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub field: String,
    pub alias: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    /// Whether an explicit `null` is accepted for the field.
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    /// Trim surrounding whitespace before checking.
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub lowercase: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: FieldTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    /// Never exposed in API responses (e.g. passwords).
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub lowercase: bool,
    #[serde(default, deserialize_with = "deserialize_default")]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub display: Option<DisplayConfig>,
    #[serde(default)]
    pub fallback: ReferenceFallback,
    #[serde(default)]
    pub validation: ValidationRule,
}

fn default_true() -> bool {
    true
}

/// A default must be a scalar; `null` is the same as no default.
fn deserialize_default<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(serde::de::Error::custom(
            "field default must be a string, number or boolean",
        )),
        scalar => Ok(Some(scalar)),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub id: String,
    pub path_segment: String,
    pub table: String,
    pub display_name: String,
    pub plural_name: String,
    /// Message used for uniqueness conflicts instead of "<display_name> already exists".
    #[serde(default)]
    pub conflict_message: Option<String>,
    pub fields: Vec<FieldConfig>,
}

/// Whole descriptor file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub resources: Vec<ResourceConfig>,
}

fn default_schema() -> String {
    "public".into()
}
