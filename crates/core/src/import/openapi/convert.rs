//! JSON Schema to [`FieldDef`] conversion.
//!
//! Object schemas become named types in the [`TypeRegistry`]. Objects are
//! deduplicated by their sorted property names: a shape seen before reuses
//! the earlier name, a name already taken by another shape gets a numeric
//! suffix. Objects without `properties` are typed from their examples.

use std::collections::HashMap;

use indexmap::IndexMap;
use rpcgen_common::to_pascal_case;
use serde_json::{Map, Value};
use tracing::debug;

use super::refs::DocumentSet;
use super::spec::{Schema, is_null_schema};
use crate::error::ImportError;
use crate::model::{Encoding, FieldDef, FieldShape, TypeBody};
use crate::registry::TypeRegistry;

/// Converts schemas found in a [`DocumentSet`] into registry types.
pub struct SchemaConverter<'a> {
    docs: &'a DocumentSet,
    registry: &'a mut TypeRegistry,
    /// `doc#pointer` of a component schema to its type name.
    ref_names: HashMap<String, String>,
}

impl<'a> SchemaConverter<'a> {
    pub fn new(docs: &'a DocumentSet, registry: &'a mut TypeRegistry) -> Self {
        Self {
            docs,
            registry,
            ref_names: HashMap::new(),
        }
    }

    /// Convert a (possibly `$ref`) schema found in `doc`.
    ///
    /// `hint` names the type if the schema is an inline object; `examples`
    /// are values from the surrounding media type.
    pub fn field(
        &mut self,
        doc: &str,
        raw: &Value,
        hint: &str,
        examples: &[Value],
    ) -> Result<FieldDef, ImportError> {
        if let Some(reference) = raw.get("$ref").and_then(Value::as_str) {
            let (target_doc, pointer) = DocumentSet::split_ref(doc, reference);
            let ref_key = format!("{target_doc}#{pointer}");
            if let Some(name) = self.ref_names.get(&ref_key) {
                return Ok(FieldDef::named(name));
            }
            let (doc, schema_value) = self.docs.deref(doc, raw)?;
            let ref_hint = pointer.rsplit('/').next().unwrap_or(hint).to_string();
            return self.convert(&doc, &schema_value, &ref_hint, examples, Some(ref_key));
        }
        self.convert(doc, raw, hint, examples, None)
    }

    fn convert(
        &mut self,
        doc: &str,
        raw: &Value,
        hint: &str,
        examples: &[Value],
        ref_key: Option<String>,
    ) -> Result<FieldDef, ImportError> {
        let schema = parse_schema(raw, hint)?;
        let mut examples: Vec<Value> = examples.to_vec();
        if let Some(example) = &schema.example {
            examples.push(example.clone());
        }

        let mut def = if let Some(parts) = &schema.all_of {
            let merged = self.merge_all_of(doc, parts)?;
            let name = self.object_type(doc, &merged, hint, &examples, ref_key)?;
            FieldDef::named(&name)
        } else if let Some(variants) = schema.any_of.as_ref().or(schema.one_of.as_ref()) {
            let non_null: Vec<&Value> = variants.iter().filter(|v| !is_null_schema(v)).collect();
            let nullable = non_null.len() < variants.len();
            let mut def = match non_null.as_slice() {
                [single] => self.field(doc, single, hint, &examples)?,
                _ => FieldDef::named("any"),
            };
            def.optional |= nullable;
            def
        } else if schema.primary_type() == Some("array") || schema.items.is_some() {
            self.array_field(doc, &schema, hint, &examples)?
        } else if schema.properties.is_some() {
            let name = self.object_type(doc, &schema, hint, &examples, ref_key)?;
            FieldDef::named(&name)
        } else if schema.primary_type() == Some("object") || schema.primary_type().is_none() {
            let objects: Vec<&Map<String, Value>> =
                examples.iter().filter_map(Value::as_object).collect();
            if objects.is_empty() {
                FieldDef::named("any")
            } else {
                let name = self.infer_object(&objects, hint)?;
                if let Some(key) = ref_key {
                    self.ref_names.insert(key, name.clone());
                }
                FieldDef::named(&name)
            }
        } else {
            primitive_field(&schema)
        };

        if schema.is_nullable() {
            def.optional = true;
        }
        if let Some(descr) = &schema.description
            && def.descr.is_empty()
        {
            def.descr = descr.trim().to_string();
        }
        if def.default.is_none() {
            def.default.clone_from(&schema.default);
        }
        Ok(def)
    }

    fn array_field(
        &mut self,
        doc: &str,
        schema: &Schema,
        hint: &str,
        examples: &[Value],
    ) -> Result<FieldDef, ImportError> {
        let item_examples: Vec<Value> = examples
            .iter()
            .filter_map(Value::as_array)
            .flatten()
            .cloned()
            .collect();
        let item_hint = format!("{hint}Item");
        let mut def = match &schema.items {
            Some(items) => self.field(doc, items, &item_hint, &item_examples)?,
            None => FieldDef::named("any"),
        };
        if def.array {
            // nested arrays have no native representation
            def = FieldDef::named("any");
        }
        def.array = true;
        def.min_length = schema.min_items;
        def.max_length = schema.max_items;
        def.optional = false;
        Ok(def)
    }

    fn merge_all_of(&self, doc: &str, parts: &[Value]) -> Result<Schema, ImportError> {
        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        let mut description = None;
        for part in parts {
            let (_, value) = self.docs.deref(doc, part)?;
            let part = parse_schema(&value, "allOf")?;
            if let Some(props) = part.properties {
                properties.extend(props);
            }
            required.extend(part.required);
            description = description.or(part.description);
        }
        Ok(Schema {
            properties: Some(properties),
            required,
            description,
            ..Schema::default()
        })
    }

    /// Register (or reuse) an object type for a schema with `properties`.
    fn object_type(
        &mut self,
        doc: &str,
        schema: &Schema,
        hint: &str,
        examples: &[Value],
        ref_key: Option<String>,
    ) -> Result<String, ImportError> {
        let properties = schema.properties.clone().unwrap_or_default();
        let mut key: Vec<String> = properties.keys().cloned().collect();
        key.sort();

        if let Some(existing) = self.registry.find_by_shape(&key).map(str::to_string) {
            debug!(hint, existing = %existing, "reusing structurally identical type");
            if let Some(ref_key) = ref_key {
                self.ref_names.insert(ref_key, existing.clone());
            }
            self.refine_any_fields(doc, &existing, schema, examples)?;
            return Ok(existing);
        }

        let name = self.free_name(hint)?;
        if let Some(ref_key) = ref_key {
            self.ref_names.insert(ref_key, name.clone());
        }
        // placeholder so recursive references and same-shape siblings resolve to this name
        let placeholder = TypeBody {
            extends: None,
            fields: key
                .iter()
                .map(|k| (k.clone(), FieldShape::Short("any".to_string())))
                .collect(),
        };
        self.registry.insert(name.clone(), placeholder);

        let mut fields = IndexMap::new();
        for (prop, prop_schema) in &properties {
            let prop_examples = property_examples(examples, prop);
            let mut def = self.field(
                doc,
                prop_schema,
                &format!("{name}{}", to_pascal_case(prop)),
                &prop_examples,
            )?;
            if !schema.required.contains(prop) {
                def.optional = true;
            }
            fields.insert(prop.clone(), FieldShape::from(def));
        }
        self.registry.insert(
            name.clone(),
            TypeBody {
                extends: None,
                fields,
            },
        );
        debug!(name = %name, "registered imported type");
        Ok(name)
    }

    /// Fill in properties of a reused type that were only known as `any`.
    fn refine_any_fields(
        &mut self,
        doc: &str,
        name: &str,
        schema: &Schema,
        examples: &[Value],
    ) -> Result<(), ImportError> {
        let Some(properties) = &schema.properties else {
            return Ok(());
        };
        let Some(existing) = self.registry.get(name) else {
            return Ok(());
        };
        let untyped: Vec<String> = existing
            .fields
            .iter()
            .filter(|(_, shape)| shape.to_def().type_name() == Some("any"))
            .map(|(k, _)| k.clone())
            .collect();

        for prop in untyped {
            let Some(prop_schema) = properties.get(&prop) else {
                continue;
            };
            let prop_examples = property_examples(examples, &prop);
            let mut def = self.field(
                doc,
                prop_schema,
                &format!("{name}{}", to_pascal_case(&prop)),
                &prop_examples,
            )?;
            if def.type_name() == Some("any") && !def.array {
                continue;
            }
            if !schema.required.contains(&prop) {
                def.optional = true;
            }
            if let Some(body) = self.registry.get_mut(name) {
                body.fields.insert(prop, FieldShape::from(def));
            }
        }
        Ok(())
    }

    fn free_name(&self, hint: &str) -> Result<String, ImportError> {
        let base = to_pascal_case(hint);
        let base = if base.is_empty() { "Object".to_string() } else { base };
        if !self.registry.contains(&base) {
            return Ok(base);
        }
        (1..=999)
            .map(|i| format!("{base}{i}"))
            .find(|candidate| !self.registry.contains(candidate))
            .ok_or(ImportError::SuffixExhausted(base))
    }

    /// Build an object type from example values; every property is required.
    fn infer_object(
        &mut self,
        samples: &[&Map<String, Value>],
        hint: &str,
    ) -> Result<String, ImportError> {
        let mut guesses: IndexMap<String, Guess> = IndexMap::new();
        for sample in samples {
            for (prop, value) in *sample {
                let guess = Guess::of(value, hint, prop)?;
                let merged = match guesses.get(prop) {
                    Some(prev) => prev.clone().unify(guess, hint, prop)?,
                    None => guess,
                };
                guesses.insert(prop.clone(), merged);
            }
        }

        let mut key: Vec<String> = guesses.keys().cloned().collect();
        key.sort();
        if let Some(existing) = self.registry.find_by_shape(&key) {
            return Ok(existing.to_string());
        }

        let name = self.free_name(hint)?;
        self.registry.insert(
            name.clone(),
            TypeBody {
                extends: None,
                fields: key
                    .iter()
                    .map(|k| (k.clone(), FieldShape::Short("any".to_string())))
                    .collect(),
            },
        );
        let mut fields = IndexMap::new();
        for (prop, guess) in guesses {
            let def = self.guess_field(guess, &format!("{name}{}", to_pascal_case(&prop)))?;
            fields.insert(prop, FieldShape::from(def));
        }
        self.registry.insert(
            name.clone(),
            TypeBody {
                extends: None,
                fields,
            },
        );
        debug!(name = %name, "registered type inferred from examples");
        Ok(name)
    }

    fn guess_field(&mut self, guess: Guess, hint: &str) -> Result<FieldDef, ImportError> {
        Ok(match guess {
            Guess::Any => FieldDef::named("any"),
            Guess::Bool => FieldDef::named("bool"),
            Guess::Int => FieldDef::named("int64"),
            Guess::Float => FieldDef::named("float"),
            Guess::Str => FieldDef::named("string"),
            Guess::List(inner) => {
                let mut def = match *inner {
                    Guess::List(_) => FieldDef::named("any"),
                    other => self.guess_field(other, &format!("{hint}Item"))?,
                };
                def.array = true;
                def
            }
            Guess::Object(samples) => {
                let refs: Vec<&Map<String, Value>> = samples.iter().collect();
                FieldDef::named(&self.infer_object(&refs, hint)?)
            }
        })
    }
}

fn parse_schema(raw: &Value, location: &str) -> Result<Schema, ImportError> {
    if raw.as_bool() == Some(true) || raw.is_null() {
        return Ok(Schema::default());
    }
    serde_json::from_value(raw.clone()).map_err(|e| ImportError::Parse {
        location: location.to_string(),
        message: e.to_string(),
    })
}

fn property_examples(examples: &[Value], prop: &str) -> Vec<Value> {
    examples
        .iter()
        .filter_map(|e| e.get(prop))
        .cloned()
        .collect()
}

fn primitive_field(schema: &Schema) -> FieldDef {
    let format = schema.format.as_deref();
    let mut def = match (schema.primary_type(), format) {
        (Some("boolean"), _) => FieldDef::named("bool"),
        (Some("integer"), Some("int32")) => FieldDef::named("int32"),
        (Some("integer"), Some("uint32")) => FieldDef::named("uint32"),
        (Some("integer"), Some("uint64")) => FieldDef::named("uint64"),
        (Some("integer"), _) => FieldDef::named("int64"),
        (Some("number"), _) => FieldDef::named("float"),
        (Some("string"), Some("byte")) => {
            let mut def = FieldDef::named("bytes");
            def.encoding = Some(Encoding::Base64);
            def
        }
        (Some("string"), Some("binary")) => {
            let mut def = FieldDef::named("bytes");
            def.encoding = Some(Encoding::Utf8);
            def
        }
        (Some("string"), _) => FieldDef::named("string"),
        _ => FieldDef::named("any"),
    };
    if def.type_name() == Some("string") {
        def.min_length = schema.min_length;
        def.max_length = schema.max_length;
        if matches!(format, Some("uri" | "url")) {
            def.format = Some("url".to_string());
        }
        if let Some(values) = &schema.enum_values {
            let strings: Vec<String> = values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if !strings.is_empty() {
                def.enum_values = Some(strings);
            }
        }
    }
    def
}

/// Type guessed from an example value.
#[derive(Debug, Clone)]
enum Guess {
    Any,
    Bool,
    Int,
    Float,
    Str,
    List(Box<Guess>),
    Object(Vec<Map<String, Value>>),
}

impl Guess {
    fn of(value: &Value, location: &str, prop: &str) -> Result<Self, ImportError> {
        Ok(match value {
            Value::Null => Guess::Any,
            Value::Bool(_) => Guess::Bool,
            Value::Number(n) if n.is_f64() => Guess::Float,
            Value::Number(_) => Guess::Int,
            Value::String(_) => Guess::Str,
            Value::Array(items) => {
                let mut inner = Guess::Any;
                for item in items {
                    inner = inner.unify(Guess::of(item, location, prop)?, location, prop)?;
                }
                Guess::List(Box::new(inner))
            }
            Value::Object(map) => Guess::Object(vec![map.clone()]),
        })
    }

    fn label(&self) -> &'static str {
        match self {
            Guess::Any => "null",
            Guess::Bool => "bool",
            Guess::Int => "integer",
            Guess::Float => "number",
            Guess::Str => "string",
            Guess::List(_) => "array",
            Guess::Object(_) => "object",
        }
    }

    /// Merge two guesses for the same property. Integer and number widen to
    /// number; any other disagreement is an error.
    fn unify(self, other: Guess, location: &str, prop: &str) -> Result<Guess, ImportError> {
        Ok(match (self, other) {
            (Guess::Any, g) | (g, Guess::Any) => g,
            (Guess::Int | Guess::Float, Guess::Float) | (Guess::Float, Guess::Int) => Guess::Float,
            (Guess::List(a), Guess::List(b)) => Guess::List(Box::new(a.unify(*b, location, prop)?)),
            (Guess::Object(mut a), Guess::Object(b)) => {
                a.extend(b);
                Guess::Object(a)
            }
            (a, b) if a.label() == b.label() => a,
            (a, b) => {
                return Err(ImportError::ConflictingInference {
                    location: location.to_string(),
                    property: prop.to_string(),
                    first: a.label().to_string(),
                    second: b.label().to_string(),
                });
            }
        })
    }
}
