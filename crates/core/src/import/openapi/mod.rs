//! OpenAPI importer.
//!
//! Loads a document from a file or URL, follows `$ref`s (including into
//! sibling files for local documents) and synthesizes one RPC method per
//! operation:
//! - path params are required, query params optional, the JSON request
//!   body becomes a `body` param
//! - the result comes from the highest-priority success response;
//!   `204`-only operations return nothing

pub mod convert;
pub mod naming;
pub mod refs;
pub mod spec;

use std::path::Path;

use indexmap::IndexMap;
use rpcgen_common::{to_pascal_case, to_snake_case};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use self::convert::SchemaConverter;
use self::refs::{DocumentSet, ROOT, document_path, external_refs};
use self::spec::{OpenApiDoc, Operation, Parameter, PathItem, RequestBody, Response, json_media};
use crate::error::ImportError;
use crate::model::{FieldDef, FieldShape, HttpBinding, OpenApiSource, RpcFunctionDef};
use crate::registry::TypeRegistry;

/// Success responses in the order they are considered for the result.
pub const RESPONSE_PRIORITY: &[&str] = &["200", "201", "202", "203", "206", "207", "default", "2XX"];

/// Name of the synthesized request-body param.
pub const BODY_PARAM: &str = "body";

/// Load the document named by `source` and import its operations.
///
/// Relative paths are resolved against `schema_dir`, the directory of the
/// schema file carrying the directive. Types are added to `registry`.
pub async fn import(
    source: &OpenApiSource,
    schema_dir: &Path,
    registry: &mut TypeRegistry,
) -> Result<IndexMap<String, RpcFunctionDef>, ImportError> {
    let docs = load(&source.source, schema_dir).await?;
    let methods = import_document(&docs, &source.prefix, registry)?;
    info!(source = %source.source, methods = methods.len(), "imported OpenAPI document");
    Ok(methods)
}

/// Load a root document and, for local files, every document it references.
pub async fn load(source: &str, schema_dir: &Path) -> Result<DocumentSet, ImportError> {
    if let Ok(url) = Url::parse(source)
        && matches!(url.scheme(), "http" | "https")
    {
        let body = fetch(&url).await?;
        let root = parse_document(&body, url.path(), source)?;
        return Ok(DocumentSet::new(root, true));
    }

    let path = schema_dir.join(source);
    let root = read_document(&path).await?;
    let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut docs = DocumentSet::new(root, false);

    let mut pending = external_refs(ROOT, docs.root());
    while let Some(key) = pending.pop() {
        if docs.contains(&key) {
            continue;
        }
        let doc = read_document(&document_path(&base_dir, &key)).await?;
        pending.extend(external_refs(&key, &doc));
        debug!(document = %key, "loaded referenced document");
        docs.insert(key, doc);
    }
    Ok(docs)
}

async fn fetch(url: &Url) -> Result<String, ImportError> {
    let fetch_err = |e: reqwest::Error| ImportError::Fetch {
        url: url.to_string(),
        message: e.to_string(),
    };
    debug!(url = %url, "fetching OpenAPI document");
    let response = reqwest::get(url.clone()).await.map_err(fetch_err)?;
    let response = response.error_for_status().map_err(fetch_err)?;
    response.text().await.map_err(fetch_err)
}

async fn read_document(path: &Path) -> Result<Value, ImportError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    parse_document(&text, &path.to_string_lossy(), &path.display().to_string())
}

/// Parse JSON or YAML by the extension of `name`.
pub fn parse_document(text: &str, name: &str, location: &str) -> Result<Value, ImportError> {
    let parse_err = |message: String| ImportError::Parse {
        location: location.to_string(),
        message,
    };
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "json" => serde_json::from_str(text).map_err(|e| parse_err(e.to_string())),
        "yml" | "yaml" => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| parse_err(e.to_string()))?;
            Ok(yaml_to_json(yaml))
        }
        other => Err(ImportError::UnsupportedExtension(other.to_string())),
    }
}

/// YAML to JSON, stringifying non-string mapping keys (`200:` response codes).
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map_or(Value::Null, Value::from)
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(items) => Value::Array(items.into_iter().map(yaml_to_json).collect()),
        Y::Mapping(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let key = match k {
                        Y::String(s) => s,
                        Y::Bool(b) => b.to_string(),
                        Y::Number(n) => n.to_string(),
                        other => serde_yaml::to_string(&other)
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                    };
                    (key, yaml_to_json(v))
                })
                .collect(),
        ),
        Y::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Synthesize methods for every operation of a loaded document.
pub fn import_document(
    docs: &DocumentSet,
    prefix: &str,
    registry: &mut TypeRegistry,
) -> Result<IndexMap<String, RpcFunctionDef>, ImportError> {
    let doc: OpenApiDoc = serde_json::from_value(docs.root().clone()).map_err(|e| {
        ImportError::Parse {
            location: "openapi document".to_string(),
            message: e.to_string(),
        }
    })?;
    let mut converter = SchemaConverter::new(docs, registry);
    let mut methods = IndexMap::new();

    for (path, raw_item) in &doc.paths {
        let (item_doc, item_value) = docs.deref(ROOT, raw_item)?;
        let item: PathItem = from_value(&item_value, path)?;
        for (http_method, op) in item.operations() {
            let base = format!("{prefix}{}", naming::function_name(http_method, path));
            let name = if methods.contains_key(&base) {
                let by = naming::last_path_param(path)
                    .map(|p| format!("{base}_by_{}", to_snake_case(p)))
                    .filter(|n| !methods.contains_key(n));
                by.ok_or_else(|| ImportError::DuplicateFunction {
                    name: base.clone(),
                    method: http_method.to_uppercase(),
                    path: path.clone(),
                })?
            } else {
                base
            };
            let def = operation(
                &mut converter,
                docs,
                &item_doc,
                &name,
                http_method,
                path,
                &item.parameters,
                op,
            )?;
            debug!(method = %name, http = %http_method, path = %path, "synthesized method");
            methods.insert(name, def);
        }
    }
    Ok(methods)
}

fn from_value<T: serde::de::DeserializeOwned>(value: &Value, location: &str) -> Result<T, ImportError> {
    serde_json::from_value(value.clone()).map_err(|e| ImportError::Parse {
        location: location.to_string(),
        message: e.to_string(),
    })
}

#[allow(clippy::too_many_arguments)]
fn operation(
    converter: &mut SchemaConverter<'_>,
    docs: &DocumentSet,
    doc: &str,
    name: &str,
    http_method: &str,
    path: &str,
    shared_params: &[Value],
    op: &Operation,
) -> Result<RpcFunctionDef, ImportError> {
    let hint = to_pascal_case(name);
    let mut params: IndexMap<String, FieldShape> = IndexMap::new();
    let mut binding = HttpBinding {
        method: http_method.to_uppercase(),
        path: path.to_string(),
        path_params: Vec::new(),
        query_params: Vec::new(),
        body_param: None,
    };

    // operation-level params override path-level ones with the same name and location
    let mut declared: IndexMap<(String, String), (String, Parameter)> = IndexMap::new();
    for raw in shared_params.iter().chain(&op.parameters) {
        let (param_doc, value) = docs.deref(doc, raw)?;
        let param: Parameter = from_value(&value, &format!("{path} parameter"))?;
        declared.insert((param.location.clone(), param.name.clone()), (param_doc, param));
    }

    // path params first, in path order
    for segment in naming::segments(path) {
        let naming::Segment::Param(param_name) = segment else {
            continue;
        };
        let found = declared.get(&("path".to_string(), param_name.to_string()));
        let mut def = match found {
            Some((param_doc, param)) => param_field(converter, param_doc, &hint, param)?,
            None => FieldDef::named("string"),
        };
        def.optional = false;
        params.insert(param_name.to_string(), FieldShape::from(def));
        binding.path_params.push(param_name.to_string());
    }

    for ((location, param_name), (param_doc, param)) in &declared {
        if location != "query" {
            continue;
        }
        let def = param_field(converter, param_doc, &hint, param)?.optional();
        params.insert(param_name.clone(), FieldShape::from(def));
        binding.query_params.push(param_name.clone());
    }

    if let Some(raw_body) = &op.request_body {
        let (body_doc, value) = docs.deref(doc, raw_body)?;
        let body: RequestBody = from_value(&value, &format!("{path} requestBody"))?;
        let mut def = match json_media(&body.content) {
            Some(media) => media_field(converter, &body_doc, media, &format!("{hint}Body"), docs)?,
            None => Some(FieldDef::named("any")),
        }
        .unwrap_or_else(|| FieldDef::named("any"));
        def.optional = !body.required;
        if def.descr.is_empty()
            && let Some(descr) = &body.description
        {
            def.descr = descr.trim().to_string();
        }
        params.insert(BODY_PARAM.to_string(), FieldShape::from(def));
        binding.body_param = Some(BODY_PARAM.to_string());
    }

    let result = response_field(converter, docs, doc, op, &hint, http_method, path)?;

    Ok(RpcFunctionDef {
        descr: op.doc(),
        params,
        result: result.map(FieldShape::from),
        http: Some(binding),
        ..RpcFunctionDef::default()
    })
}

fn param_field(
    converter: &mut SchemaConverter<'_>,
    doc: &str,
    hint: &str,
    param: &Parameter,
) -> Result<FieldDef, ImportError> {
    let mut def = match &param.schema {
        Some(schema) => converter.field(doc, schema, &format!("{hint}{}", to_pascal_case(&param.name)), &[])?,
        None => FieldDef::named("string"),
    };
    if let Some(descr) = &param.description {
        def.descr = descr.trim().to_string();
    }
    def.optional = !param.required;
    Ok(def)
}

/// Field for a media type's schema, typed from its examples when the schema
/// is absent. `None` when there is nothing to go on.
fn media_field(
    converter: &mut SchemaConverter<'_>,
    doc: &str,
    media: &spec::MediaType,
    hint: &str,
    docs: &DocumentSet,
) -> Result<Option<FieldDef>, ImportError> {
    let mut examples = Vec::new();
    if let Some(example) = &media.example {
        examples.push(example.clone());
    }
    for raw in media.examples.values() {
        let (_, example) = docs.deref(doc, raw)?;
        if let Some(value) = example.get("value") {
            examples.push(value.clone());
        }
    }
    let schema = media.schema.clone().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    if media.schema.is_none() && examples.is_empty() {
        return Ok(None);
    }
    converter.field(doc, &schema, hint, &examples).map(Some)
}

#[allow(clippy::too_many_arguments)]
fn response_field(
    converter: &mut SchemaConverter<'_>,
    docs: &DocumentSet,
    doc: &str,
    op: &Operation,
    hint: &str,
    http_method: &str,
    path: &str,
) -> Result<Option<FieldDef>, ImportError> {
    for code in RESPONSE_PRIORITY {
        let Some(raw) = op.responses.get(*code) else {
            continue;
        };
        let (response_doc, value) = docs.deref(doc, raw)?;
        let response: Response = from_value(&value, &format!("{path} response {code}"))?;
        let Some(media) = json_media(&response.content) else {
            return Ok(None);
        };
        return media_field(converter, &response_doc, media, &format!("{hint}Result"), docs);
    }
    if op.responses.contains_key("204") {
        return Ok(None);
    }
    if let Some(code) = op.responses.keys().find(|c| c.starts_with('2')) {
        warn!(code = %code, path, "success response outside the priority list, returning nothing");
        return Ok(None);
    }
    Err(ImportError::MissingResponse {
        method: http_method.to_uppercase(),
        path: path.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn import_json(doc: Value, prefix: &str) -> (IndexMap<String, RpcFunctionDef>, TypeRegistry) {
        let docs = DocumentSet::new(doc, false);
        let mut registry = TypeRegistry::new();
        let methods = import_document(&docs, prefix, &mut registry).unwrap();
        (methods, registry)
    }

    fn users_api() -> Value {
        json!({
            "openapi": "3.0.0",
            "paths": {
                "/users": {
                    "get": {
                        "summary": "List users",
                        "parameters": [{"name": "limit", "in": "query", "schema": {"type": "integer", "format": "int32"}}],
                        "responses": {"200": {"content": {"application/json": {"schema": {
                            "type": "array", "items": {"$ref": "#/components/schemas/User"}
                        }}}}}
                    },
                    "post": {
                        "requestBody": {"required": true, "content": {"application/json": {"schema": {
                            "type": "object", "required": ["name"], "properties": {"name": {"type": "string"}}
                        }}}},
                        "responses": {"201": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/User"}}}}}
                    }
                },
                "/users/{id}": {
                    "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "integer"}}],
                    "get": {"responses": {"200": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/User"}}}}}},
                    "delete": {"responses": {"204": {"description": "gone"}}}
                }
            },
            "components": {"schemas": {"User": {
                "type": "object",
                "required": ["id", "name"],
                "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
            }}}
        })
    }

    #[test]
    fn test_synthesized_methods() {
        let (methods, registry) = import_json(users_api(), "api_");
        let names: Vec<&str> = methods.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["api_get_users", "api_create_user", "api_get_user", "api_delete_user"]);

        let list = &methods["api_get_users"];
        assert_eq!(list.descr, "List users");
        let limit = list.params["limit"].to_def();
        assert!(limit.optional);
        assert_eq!(limit.type_name(), Some("int32"));
        let result = list.result.as_ref().unwrap().to_def();
        assert!(result.array);
        assert_eq!(result.type_name(), Some("User"));
        assert_eq!(list.http.as_ref().unwrap().query_params, vec!["limit"]);

        let create = &methods["api_create_user"];
        let body = create.params[BODY_PARAM].to_def();
        assert!(!body.optional);
        assert_eq!(body.type_name(), Some("ApiCreateUserBody"));
        assert!(registry.contains("ApiCreateUserBody"));

        let get = &methods["api_get_user"];
        assert!(!get.params["id"].to_def().optional);
        assert_eq!(get.http.as_ref().unwrap().path_params, vec!["id"]);
        assert!(methods["api_delete_user"].result.is_none());
    }

    #[test]
    fn test_name_collision_uses_last_path_param() {
        let doc = json!({"paths": {
            "/orgs/{org}/members": {"get": {"responses": {"204": {}}}},
            "/teams/{team}/members": {"get": {"responses": {"204": {}}}},
        }});
        let (methods, _) = import_json(doc, "");
        let names: Vec<&str> = methods.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["get_members", "get_members_by_team"]);
    }

    #[test]
    fn test_unresolvable_collision_is_fatal() {
        let doc = json!({"paths": {
            "/a/members": {"get": {"responses": {"204": {}}}},
            "/b/members": {"get": {"responses": {"204": {}}}},
        }});
        let docs = DocumentSet::new(doc, false);
        let err = import_document(&docs, "", &mut TypeRegistry::new()).unwrap_err();
        assert!(matches!(err, ImportError::DuplicateFunction { ref name, .. } if name == "get_members"));
    }

    #[test]
    fn test_missing_success_response() {
        let doc = json!({"paths": {"/x": {"get": {"responses": {"404": {}}}}}});
        let docs = DocumentSet::new(doc, false);
        let err = import_document(&docs, "", &mut TypeRegistry::new()).unwrap_err();
        assert_eq!(err.to_string(), "GET /x: no success response");
    }

    #[test]
    fn test_result_inferred_from_media_example() {
        let doc = json!({"paths": {"/stats": {"get": {"responses": {"default": {"content": {
            "application/json": {"example": {"total": 3, "avg": 1.5}}
        }}}}}}});
        let (methods, registry) = import_json(doc, "");
        let result = methods["get_stats"].result.as_ref().unwrap().to_def();
        assert_eq!(result.type_name(), Some("GetStatsResult"));
        let body = registry.get("GetStatsResult").unwrap();
        assert_eq!(body.fields["avg"].to_def().type_name(), Some("float"));
    }

    #[test]
    fn test_parse_yaml_with_numeric_response_keys() {
        let doc = parse_document(
            "paths:\n  /ping:\n    get:\n      responses:\n        200:\n          description: ok\n",
            "api.yaml",
            "api.yaml",
        )
        .unwrap();
        assert!(doc["paths"]["/ping"]["get"]["responses"].get("200").is_some());
        let err = parse_document("", "api.txt", "api.txt").unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedExtension(ref e) if e == "txt"));
    }
}
