//! Docs backend: one markdown page per group plus the config reference.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use super::swift::{class_name, method_ident, type_ident};
use super::{Backend, FileSet, GENERATED_BANNER, render_template};
use crate::emit::rpc::{describe, example_request, example_response, param_table, returns_text, type_link};
use crate::error::Result;
use crate::registry::{FieldKind, ResolvedField};
use crate::resolved::{ResolvedGroup, ResolvedMethod, ResolvedModel};

const GROUP_TEMPLATE: &str = r#"<!-- {{ banner }} -->

# {{ title }}: {{ group }}

{% if descr %}{{ descr }}{% endif %}

## Methods

{% for m in methods %}- [{{ m.name }}](#{{ m.anchor }})
{% endfor %}
{% for m in methods %}
### {{ m.name }}

{% if m.descr %}{{ m.descr }}{% endif %}

{% if m.alias %}Alias of {{ m.alias }}.{% endif %}

{% if m.params %}**Parameters**

{{ m.params }}{% else %}**Parameters**: none{% endif %}

**Returns**: {{ m.returns }}

**Request**

```json
{{ m.request }}
```

{% if m.response %}**Response**

```json
{{ m.response }}
```
{% endif %}
**curl**

```sh
{{ m.curl }}
```

**Swift**

```swift
{{ m.swift }}
```

{% if m.see_also %}See also: {{ m.see_also | join(sep=", ") }}{% endif %}
{% endfor %}
{% if types %}## Types
{% for t in types %}
### {{ t.name }}

| field | type | required | description |
|---|---|---|---|
{% for f in t.fields %}| `{{ f.name }}` | {{ f.ty }} | {{ f.required }} | {{ f.descr }} |
{% endfor %}{% endfor %}{% endif %}
"#;

const CONFIG_TEMPLATE: &str = r#"<!-- {{ banner }} -->

# {{ title }}: configuration

{% if options %}| option | type | default | env | flag | description |
|---|---|---|---|---|---|
{% for o in options %}| `{{ o.name }}` | `{{ o.ty }}` | {{ o.default }} | {{ o.env }} | {{ o.flag }} | {{ o.descr }} |
{% endfor %}{% else %}No configuration options are defined.
{% endif %}"#;

/// Emits `docs/*.md`.
#[derive(Debug, Clone)]
pub struct DocsBackend {
    title: String,
}

#[derive(Debug, Serialize)]
struct MethodDoc {
    name: String,
    anchor: String,
    descr: String,
    alias: String,
    params: String,
    returns: String,
    request: String,
    response: String,
    curl: String,
    swift: String,
    see_also: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TypeDoc {
    name: String,
    fields: Vec<FieldRow>,
}

#[derive(Debug, Serialize)]
struct FieldRow {
    name: String,
    ty: String,
    required: &'static str,
    descr: String,
}

#[derive(Debug, Serialize)]
struct OptionRow {
    name: String,
    ty: String,
    default: String,
    env: String,
    flag: String,
    descr: String,
}

/// GitHub-style heading anchor.
pub fn anchor(heading: &str) -> String {
    heading
        .trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            _ => None,
        })
        .collect()
}

fn table_cell(text: &str) -> String {
    text.trim().replace('|', "\\|").replace('\n', " ")
}

/// Drop runs of blank lines left behind by empty template sections.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank += 1;
            if blank > 1 {
                continue;
            }
        } else {
            blank = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Request body of a JSON-RPC call.
pub fn rpc_request(method: &str, params: &[Value]) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    })
}

/// Successful JSON-RPC response.
pub fn rpc_response(result: &Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result,
    })
}

fn curl_snippet(request: &Value) -> String {
    let body = request.to_string().replace('\'', "'\\''");
    format!(
        "curl -s -X POST \"$RPC_URL\" \\\n  -H 'Content-Type: application/json' \\\n  -d '{body}'"
    )
}

fn swift_literal(model: &ResolvedModel, field: &ResolvedField, value: &Value, array_item: bool) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => match &field.enum_values {
            Some(values) if values.contains(s) => {
                format!(".{}", rpcgen_common::sanitize_swift_identifier(s))
            }
            _ => format!("\"{}\"", rpcgen_common::escape_swift_string(s)),
        },
        Value::Array(items) if field.array && !array_item => {
            let items: Vec<String> = items
                .iter()
                .map(|item| swift_literal(model, field, item, true))
                .collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => match (&field.kind, model.type_def(field.object().unwrap_or_default())) {
            (FieldKind::Object(name), Some(ty)) => {
                let args: Vec<String> = ty
                    .fields
                    .values()
                    .filter_map(|f| {
                        map.get(&f.name).map(|v| {
                            format!(
                                "{}: {}",
                                rpcgen_common::sanitize_swift_identifier(&f.name),
                                swift_literal(model, f, v, false)
                            )
                        })
                    })
                    .collect();
                format!("{}({})", type_ident(name), args.join(", "))
            }
            _ => format!("\"{}\"", rpcgen_common::escape_swift_string(&value.to_string())),
        },
        Value::Array(_) => format!("\"{}\"", rpcgen_common::escape_swift_string(&value.to_string())),
    }
}

fn swift_snippet(model: &ResolvedModel, group: &ResolvedGroup, method: &ResolvedMethod, request: &[Value]) -> String {
    let args: Vec<String> = method
        .params
        .iter()
        .zip(request)
        .filter(|(param, value)| !(param.optional && value.is_null()))
        .map(|(param, value)| {
            format!(
                "{}: {}",
                rpcgen_common::sanitize_swift_identifier(&param.name),
                swift_literal(model, param, value, false)
            )
        })
        .collect();
    let call = format!("try await api.{}({})", method_ident(&method.name), args.join(", "));
    let class = class_name(&group.module);
    if method.result.is_some() {
        format!("let api = {class}(transport: transport)\nlet result = {call}")
    } else {
        format!("let api = {class}(transport: transport)\n{call}")
    }
}

impl DocsBackend {
    /// Backend titling every page with `title`.
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
        }
    }

    fn link(model: &ResolvedModel, current: &ResolvedGroup, name: &str) -> String {
        match model.method(name) {
            Some(target) if !target.skip_api && target.group == current.name => {
                format!("[`{name}`](#{})", anchor(name))
            }
            Some(target) if !target.skip_api => {
                let module = model
                    .groups
                    .iter()
                    .find(|g| g.name == target.group)
                    .map_or(target.group.as_str(), |g| g.module.as_str());
                format!("[`{name}`]({module}.md#{})", anchor(name))
            }
            _ => format!("`{name}`"),
        }
    }

    fn method_doc(model: &ResolvedModel, group: &ResolvedGroup, method: &ResolvedMethod) -> MethodDoc {
        let params = example_request(model, method);
        let request = rpc_request(&method.name, &params);
        let response = example_response(model, method)
            .map(|result| pretty(&rpc_response(&result)))
            .unwrap_or_default();
        MethodDoc {
            name: method.name.clone(),
            anchor: anchor(&method.name),
            descr: method.descr.trim().to_string(),
            alias: method
                .alias
                .as_deref()
                .map(|target| Self::link(model, group, target))
                .unwrap_or_default(),
            params: param_table(method),
            returns: returns_text(method),
            request: pretty(&request),
            response,
            curl: curl_snippet(&request),
            swift: swift_snippet(model, group, method, &params),
            see_also: method
                .depends
                .iter()
                .map(|name| Self::link(model, group, name))
                .collect(),
        }
    }

    fn type_docs(model: &ResolvedModel, methods: &[&ResolvedMethod]) -> Vec<TypeDoc> {
        let mut order: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = methods
            .iter()
            .flat_map(|m| m.params.iter().chain(m.result.iter()))
            .filter_map(|f| f.object().map(str::to_string))
            .rev()
            .collect();
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(ty) = model.type_def(&name) {
                stack.extend(
                    ty.fields
                        .values()
                        .rev()
                        .filter_map(|f| f.object().map(str::to_string)),
                );
            }
            order.push(name);
        }

        order
            .iter()
            .filter_map(|name| model.type_def(name))
            .map(|ty| TypeDoc {
                name: ty.name.clone(),
                fields: ty
                    .fields
                    .values()
                    .map(|f| FieldRow {
                        name: f.name.clone(),
                        ty: type_link(f),
                        required: if f.optional { "no" } else { "yes" },
                        descr: table_cell(&describe(f)),
                    })
                    .collect(),
            })
            .collect()
    }

    fn config_page(&self, model: &ResolvedModel) -> Result<String> {
        let options: Vec<OptionRow> = model
            .config
            .iter()
            .map(|(name, option)| {
                let mut descr = option.descr.trim().to_string();
                if !option.values.is_empty() {
                    if !descr.is_empty() {
                        descr.push_str("; ");
                    }
                    descr.push_str(&format!("one of `{}`", option.values.join("`, `")));
                }
                OptionRow {
                    name: name.clone(),
                    ty: option.ty.clone(),
                    default: option
                        .default
                        .as_ref()
                        .map(|d| format!("`{d}`"))
                        .unwrap_or_default(),
                    env: option
                        .env
                        .as_ref()
                        .map(|e| format!("`{e}`"))
                        .unwrap_or_default(),
                    flag: option
                        .alias
                        .as_ref()
                        .map(|a| format!("`-{a}`"))
                        .unwrap_or_default(),
                    descr: table_cell(&descr),
                }
            })
            .collect();
        let page = render_template(
            "docs/config",
            CONFIG_TEMPLATE,
            &json!({
                "banner": GENERATED_BANNER,
                "title": self.title,
                "options": options,
            }),
        )?;
        Ok(collapse_blank_lines(&page))
    }
}

impl Backend for DocsBackend {
    fn name(&self) -> &'static str {
        "docs"
    }

    fn emit(&self, model: &ResolvedModel) -> Result<FileSet> {
        let mut files = FileSet::new();
        for group in &model.groups {
            let methods: Vec<&ResolvedMethod> =
                group.methods.iter().filter(|m| !m.skip_api).collect();
            if methods.is_empty() {
                continue;
            }
            let docs: Vec<MethodDoc> = methods
                .iter()
                .map(|m| Self::method_doc(model, group, m))
                .collect();
            let page = render_template(
                "docs/group",
                GROUP_TEMPLATE,
                &json!({
                    "banner": GENERATED_BANNER,
                    "title": self.title,
                    "group": group.name,
                    "descr": group.descr.trim(),
                    "methods": docs,
                    "types": Self::type_docs(model, &methods),
                }),
            )?;
            debug!(group = %group.name, methods = methods.len(), "docs page");
            files.insert(format!("docs/{}.md", group.module), collapse_blank_lines(&page));
        }
        files.insert("docs/config.md", self.config_page(model)?);
        Ok(files)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::ScanContext;
    use crate::model::SchemaFile;

    const SCHEMA: &str = r#"
types:
  Tx:
    to: address
    mode:
      type: string
      enum: [fast, slow]
config:
  chain_id:
    type: uint64
    descr: Chain to talk to.
    default: 1
    env: CHAIN_ID
    alias: c
eth:
  _descr: Ethereum calls.
  _module: eth_api
  eth_getBalance:
    descr: Balance of an account.
    params:
      account: address
    result: uint256
    example:
      request: ["0x1111111111111111111111111111111111111111"]
      response: "0x10"
    depends: [eth_send, net_version, missing]
  eth_send:
    params:
      tx: Tx
  balance:
    alias: eth_getBalance
net:
  net_version:
    result: string
"#;

    fn docs() -> FileSet {
        let mut ctx = ScanContext::default();
        ctx.add_schema(serde_yaml::from_str::<SchemaFile>(SCHEMA).unwrap());
        let model = ResolvedModel::build(&ctx).unwrap();
        DocsBackend::new("Wallet API").emit(&model).unwrap()
    }

    #[test]
    fn test_pages() {
        let files = docs();
        assert_eq!(
            files.paths().collect::<Vec<_>>(),
            vec!["docs/eth_api.md", "docs/net.md", "docs/config.md"]
        );
        let page = files.get("docs/eth_api.md").unwrap();
        assert!(page.starts_with("<!-- Generated by rpcgen. Do not edit. -->\n\n# Wallet API: eth\n\nEthereum calls.\n"));
        assert!(page.contains("- [eth_getBalance](#eth_getbalance)\n- [eth_send](#eth_send)\n"));
        assert!(!page.contains("\n\n\n"));
    }

    #[test]
    fn test_example_renderings() {
        let files = docs();
        let page = files.get("docs/eth_api.md").unwrap();
        assert!(page.contains(
            "```json\n{\n  \"jsonrpc\": \"2.0\",\n  \"id\": 1,\n  \"method\": \"eth_getBalance\",\n  \"params\": [\n    \"0x1111111111111111111111111111111111111111\"\n  ]\n}\n```"
        ));
        assert!(page.contains("\"result\": \"0x10\""));
        assert!(page.contains(
            "-d '{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"eth_getBalance\",\"params\":[\"0x1111111111111111111111111111111111111111\"]}'"
        ));
        assert!(page.contains(
            "let api = EthApi(transport: transport)\nlet result = try await api.ethGetBalance(account: \"0x1111111111111111111111111111111111111111\")"
        ));
        assert!(page.contains("try await api.ethSend(tx: Tx(to: \"0xabababababababababababababababababababab\", mode: .fast))"));
    }

    #[test]
    fn test_cross_links() {
        let files = docs();
        let page = files.get("docs/eth_api.md").unwrap();
        assert!(page.contains("See also: [`eth_send`](#eth_send), [`net_version`](net.md#net_version), `missing`"));
        assert!(page.contains("Alias of [`eth_getBalance`](#eth_getbalance)."));
    }

    #[test]
    fn test_types_section() {
        let files = docs();
        let page = files.get("docs/eth_api.md").unwrap();
        assert!(page.contains("## Types\n\n### Tx\n"));
        assert!(page.contains("| `mode` | `string` | yes | one of `fast`, `slow` |"));
        assert!(!files.get("docs/net.md").unwrap().contains("## Types"));
    }

    #[test]
    fn test_config_page() {
        let files = docs();
        let page = files.get("docs/config.md").unwrap();
        assert!(page.contains("| `chain_id` | `uint64` | `1` | `CHAIN_ID` | `-c` | Chain to talk to. |"));
    }

    #[test]
    fn test_anchor() {
        assert_eq!(anchor("eth_getBalance"), "eth_getbalance");
        assert_eq!(anchor("Get a thing!"), "get-a-thing");
    }
}
