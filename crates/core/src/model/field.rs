//! Field and type shapes as they appear in schema files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Byte-field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// `0x`-prefixed hex (default).
    Hex,
    /// Standard base64.
    Base64,
    /// Raw UTF-8 text.
    Utf8,
}

/// A type reference: a registered name, a primitive name, or an inline body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TypeShape {
    /// `"uint64"`, `"Tx"`.
    Name(String),
    /// `{ a: uint32, _extends: Base }`.
    Inline(TypeBody),
}

/// Object-shaped type definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TypeBody {
    /// Parent type whose fields this body overlays.
    #[serde(rename = "_extends", default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<Box<TypeShape>>,
    /// Own fields, in declaration order.
    #[serde(flatten)]
    pub fields: IndexMap<String, FieldShape>,
}

impl TypeBody {
    /// Sorted own field names, the structural dedup key.
    pub fn shape_key(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.fields.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Field as written: either a bare type string or a full definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldShape {
    /// `"bytes32[]"`.
    Short(String),
    /// `{ type: ..., optional: true, ... }`.
    Full(FieldDef),
}

impl FieldShape {
    /// Normalize into a full definition. A trailing `[]` on a short form sets `array`.
    pub fn to_def(&self) -> FieldDef {
        match self {
            FieldShape::Short(s) => FieldDef::named(s),
            FieldShape::Full(def) => match &def.ty {
                TypeShape::Name(n) if n.ends_with("[]") => {
                    let mut def = def.clone();
                    def.ty = TypeShape::Name(n.trim_end_matches("[]").to_string());
                    def.array = true;
                    def
                }
                _ => def.clone(),
            },
        }
    }
}

impl From<FieldDef> for FieldShape {
    fn from(def: FieldDef) -> Self {
        FieldShape::Full(def)
    }
}

/// One member of a type, or one parameter/result of a method.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Element type.
    #[serde(rename = "type")]
    pub ty: TypeShape,
    /// Value is a JSON array of `ty`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub array: bool,
    /// Field may be absent or null.
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    /// Value used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Lower length bound for bytes, strings and arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    /// Upper length bound for bytes, strings and arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    /// Allowed string values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Byte encoding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    /// String format hint; `url` adds a shape check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Documentation.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub descr: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl FieldDef {
    /// Field of the given type name, `[]` suffix honoured.
    pub fn named(ty: &str) -> Self {
        let (name, array) = match ty.strip_suffix("[]") {
            Some(stripped) => (stripped, true),
            None => (ty, false),
        };
        Self {
            ty: TypeShape::Name(name.to_string()),
            array,
            optional: false,
            default: None,
            min_length: None,
            max_length: None,
            enum_values: None,
            encoding: None,
            format: None,
            descr: String::new(),
        }
    }

    /// Builder-style description setter.
    pub fn with_descr(mut self, descr: impl Into<String>) -> Self {
        self.descr = descr.into();
        self
    }

    /// Builder-style optional flag.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// The type name, if this is a named reference.
    pub fn type_name(&self) -> Option<&str> {
        match &self.ty {
            TypeShape::Name(n) => Some(n),
            TypeShape::Inline(_) => None,
        }
    }
}
