//! OpenAPI document structs for serde deserialization.
//!
//! Only the subset the importer reads. Anything that may be a `$ref`
//! (schemas, parameters, bodies, responses) stays a raw `Value` so it can be
//! dereferenced in the context of the document it came from.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Root document.
#[derive(Debug, Deserialize)]
pub struct OpenApiDoc {
    /// Paths, sorted for deterministic naming.
    #[serde(default)]
    pub paths: BTreeMap<String, Value>,
}

/// A path item containing operations for different HTTP methods.
#[derive(Debug, Default, Deserialize)]
pub struct PathItem {
    pub get: Option<Operation>,
    pub put: Option<Operation>,
    pub post: Option<Operation>,
    pub delete: Option<Operation>,
    pub patch: Option<Operation>,
    /// Path-level parameters shared by all operations.
    #[serde(default)]
    pub parameters: Vec<Value>,
}

impl PathItem {
    /// Operations in a fixed method order.
    pub fn operations(&self) -> impl Iterator<Item = (&'static str, &Operation)> {
        [
            ("get", &self.get),
            ("put", &self.put),
            ("post", &self.post),
            ("delete", &self.delete),
            ("patch", &self.patch),
        ]
        .into_iter()
        .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    }
}

/// An API operation (endpoint).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Value>,
    pub request_body: Option<Value>,
    #[serde(default)]
    pub responses: IndexMap<String, Value>,
}

impl Operation {
    /// Summary, else description, else empty.
    pub fn doc(&self) -> String {
        self.summary
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// A parameter (query, path, or header).
#[derive(Debug, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
    pub schema: Option<Value>,
}

/// A request body definition.
#[derive(Debug, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

/// A response definition.
#[derive(Debug, Default, Deserialize)]
pub struct Response {
    pub description: Option<String>,
    #[serde(default)]
    pub content: IndexMap<String, MediaType>,
}

/// Media type content (e.g., application/json).
#[derive(Debug, Default, Deserialize)]
pub struct MediaType {
    pub schema: Option<Value>,
    pub example: Option<Value>,
    /// Named examples; each value is an Example object (or a `$ref` to one).
    #[serde(default)]
    pub examples: IndexMap<String, Value>,
}

/// Pick the JSON-ish media type: `application/json`, then `*+json`, then
/// anything with a schema or example.
pub fn json_media(content: &IndexMap<String, MediaType>) -> Option<&MediaType> {
    content
        .get("application/json")
        .or_else(|| {
            content
                .iter()
                .find(|(k, _)| k.ends_with("+json"))
                .map(|(_, m)| m)
        })
        .or_else(|| {
            content
                .values()
                .find(|m| m.schema.is_some() || m.example.is_some())
        })
}

/// JSON Schema definition, with child schemas left raw.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Single type or OpenAPI 3.1 type array.
    #[serde(rename = "type")]
    pub schema_type: Option<SchemaType>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub properties: Option<IndexMap<String, Value>>,
    #[serde(default)]
    pub required: Vec<String>,
    pub items: Option<Value>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    pub all_of: Option<Vec<Value>>,
    pub any_of: Option<Vec<Value>>,
    pub one_of: Option<Vec<Value>>,
    pub additional_properties: Option<Value>,
    pub nullable: Option<bool>,
    pub default: Option<Value>,
    pub example: Option<Value>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
}

/// Schema type can be a single type or an array of types (for nullable).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SchemaType {
    Single(String),
    Multiple(Vec<String>),
}

impl Schema {
    /// First non-null declared type.
    pub fn primary_type(&self) -> Option<&str> {
        match &self.schema_type {
            Some(SchemaType::Single(t)) => Some(t),
            Some(SchemaType::Multiple(types)) => {
                types.iter().map(String::as_str).find(|t| *t != "null")
            }
            None => None,
        }
    }

    /// Check if this schema is nullable (nullable flag or `null` in a type array).
    pub fn is_nullable(&self) -> bool {
        if self.nullable == Some(true) {
            return true;
        }
        matches!(&self.schema_type, Some(SchemaType::Multiple(types)) if types.iter().any(|t| t == "null"))
    }

    /// Whether the schema describes an object.
    pub fn is_object(&self) -> bool {
        self.properties.is_some() || self.primary_type() == Some("object")
    }
}

/// `{ "type": "null" }`
pub fn is_null_schema(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("null")
}
