//! `$ref` resolution across one or more loaded documents.
//!
//! Documents are keyed by their path relative to the root document (the
//! root itself is `""`). A reference is followed in the context of the
//! document it appears in; sibling keys next to a `$ref` override the
//! referenced schema's keys.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::ImportError;

/// Key of the root document.
pub const ROOT: &str = "";

const MAX_REF_HOPS: usize = 64;

/// Loaded documents.
#[derive(Debug, Default)]
pub struct DocumentSet {
    docs: HashMap<String, Value>,
    remote: bool,
}

impl DocumentSet {
    /// Start from the root document. `remote` marks a URL-fetched root,
    /// whose external references are rejected.
    pub fn new(root: Value, remote: bool) -> Self {
        let mut docs = HashMap::new();
        docs.insert(ROOT.to_string(), root);
        Self { docs, remote }
    }

    /// Add a referenced document.
    pub fn insert(&mut self, key: String, doc: Value) {
        self.docs.insert(key, doc);
    }

    /// Whether a document is loaded.
    pub fn contains(&self, key: &str) -> bool {
        self.docs.contains_key(key)
    }

    /// Root document.
    pub fn root(&self) -> &Value {
        self.docs.get(ROOT).unwrap_or(&Value::Null)
    }

    /// Whether the root came from a URL.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Split a reference made from `doc` into the target document key and
    /// JSON pointer.
    pub fn split_ref(doc: &str, reference: &str) -> (String, String) {
        let (file, pointer) = reference.split_once('#').unwrap_or((reference, ""));
        if file.is_empty() {
            return (doc.to_string(), pointer.to_string());
        }
        let base = Path::new(doc).parent().unwrap_or_else(|| Path::new(""));
        (normalize(&base.join(file)), pointer.to_string())
    }

    /// Follow `$ref` (repeatedly) from a value found in `doc`.
    ///
    /// Returns the key of the document the final value lives in together
    /// with the value, sibling overrides applied. Values without `$ref`
    /// come back unchanged.
    pub fn deref(&self, doc: &str, value: &Value) -> Result<(String, Value), ImportError> {
        let mut doc = doc.to_string();
        let mut current = value.clone();
        let mut overrides: Vec<Map<String, Value>> = Vec::new();

        for _ in 0..MAX_REF_HOPS {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok((doc, apply_overrides(current, overrides)));
            };
            let reference = reference.to_string();
            if let Value::Object(map) = &current {
                let siblings: Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| *k != "$ref")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                if !siblings.is_empty() {
                    overrides.push(siblings);
                }
            }
            let (target_doc, pointer) = Self::split_ref(&doc, &reference);
            current = self.lookup(&target_doc, &pointer, &reference)?.clone();
            doc = target_doc;
        }

        Err(ImportError::Ref {
            reference: value
                .get("$ref")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            message: "reference cycle".to_string(),
        })
    }

    fn lookup(&self, doc: &str, pointer: &str, reference: &str) -> Result<&Value, ImportError> {
        let Some(document) = self.docs.get(doc) else {
            let message = if self.remote {
                "external references are not supported for documents fetched from a URL"
            } else {
                "referenced document was not loaded"
            };
            return Err(ImportError::Ref {
                reference: reference.to_string(),
                message: message.to_string(),
            });
        };
        document.pointer(pointer).ok_or_else(|| ImportError::Ref {
            reference: reference.to_string(),
            message: format!("pointer '{pointer}' not found"),
        })
    }
}

fn apply_overrides(mut value: Value, overrides: Vec<Map<String, Value>>) -> Value {
    if let Value::Object(map) = &mut value {
        // innermost first so the outermost sibling wins
        for layer in overrides.into_iter().rev() {
            for (k, v) in layer {
                map.insert(k, v);
            }
        }
    }
    value
}

/// Every external document key referenced from `doc`.
pub fn external_refs(doc_key: &str, doc: &Value) -> Vec<String> {
    let mut out = Vec::new();
    collect_refs(doc_key, doc, &mut out);
    out.sort();
    out.dedup();
    out
}

fn collect_refs(doc_key: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str)
                && !reference.starts_with('#')
            {
                out.push(DocumentSet::split_ref(doc_key, reference).0);
            }
            for v in map.values() {
                collect_refs(doc_key, v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_refs(doc_key, v, out);
            }
        }
        _ => {}
    }
}

/// Lexically normalize a relative path into a `/`-separated key.
fn normalize(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if parts.last().is_some_and(|p| p != "..") {
                    parts.pop();
                } else {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

/// Filesystem path of a document key below the root document's directory.
pub fn document_path(base_dir: &Path, key: &str) -> PathBuf {
    base_dir.join(key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_ref_with_sibling_override() {
        let docs = DocumentSet::new(
            json!({
                "components": {"schemas": {"Id": {"type": "string", "description": "an id"}}}
            }),
            false,
        );
        let (doc, value) = docs
            .deref(
                ROOT,
                &json!({"$ref": "#/components/schemas/Id", "description": "user id"}),
            )
            .unwrap();
        assert_eq!(doc, ROOT);
        assert_eq!(value, json!({"type": "string", "description": "user id"}));
    }

    #[test]
    fn test_ref_chain_and_cycle() {
        let docs = DocumentSet::new(
            json!({
                "a": {"$ref": "#/b"},
                "b": {"type": "integer"},
                "x": {"$ref": "#/y"},
                "y": {"$ref": "#/x"},
            }),
            false,
        );
        let (_, value) = docs.deref(ROOT, &json!({"$ref": "#/a"})).unwrap();
        assert_eq!(value, json!({"type": "integer"}));
        let err = docs.deref(ROOT, &json!({"$ref": "#/x"})).unwrap_err();
        assert!(err.to_string().contains("reference cycle"));
    }

    #[test]
    fn test_external_ref_resolves_relative_to_referring_doc() {
        let mut docs = DocumentSet::new(json!({}), false);
        docs.insert(
            "schemas/user.yml".to_string(),
            json!({"User": {"$ref": "common.yml#/Name"}}),
        );
        docs.insert("schemas/common.yml".to_string(), json!({"Name": {"type": "string"}}));
        let (doc, value) = docs
            .deref(ROOT, &json!({"$ref": "schemas/user.yml#/User"}))
            .unwrap();
        assert_eq!(doc, "schemas/common.yml");
        assert_eq!(value, json!({"type": "string"}));
    }

    #[test]
    fn test_external_ref_from_remote_root_is_rejected() {
        let docs = DocumentSet::new(json!({}), true);
        let err = docs
            .deref(ROOT, &json!({"$ref": "other.yml#/X"}))
            .unwrap_err();
        assert!(err.to_string().contains("fetched from a URL"));
    }

    #[test]
    fn test_external_refs_collected_and_normalized() {
        let doc = json!({
            "a": {"$ref": "./defs/../types.json#/A"},
            "b": [{"$ref": "types.json#/B"}, {"$ref": "#/local"}],
        });
        assert_eq!(external_refs(ROOT, &doc), vec!["types.json".to_string()]);
    }
}
