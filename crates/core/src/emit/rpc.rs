//! RPC function emitter.
//!
//! For each method, in declared parameter order, gathers parse, validation
//! and forward fragments and emits the handler, its dispatch entry and the
//! module's dispatch function. Documentation fragments shared by the docs
//! and Swift backends are built here too.

use rpcgen_common::{common_prefix, sanitize_c_identifier};
use serde_json::Value;

use super::c::{CFunction, CItem, CStmt, CType, Emit, c_str};
use super::structs::{field_c_type, value_stmts};
use crate::registry::{FieldKind, ResolvedField};
use crate::resolved::{ResolvedGroup, ResolvedMethod, ResolvedModel};

/// Handler symbol for a method.
pub fn handler_fn(prefix: &str, method: &str) -> String {
    format!("{prefix}_handle_{}", sanitize_c_identifier(method))
}

/// Implementation hook a method's handler forwards to.
pub fn impl_fn(prefix: &str, method: &str) -> String {
    format!("{prefix}_impl_{}", sanitize_c_identifier(method))
}

/// Per-module dispatch function.
pub fn dispatch_fn(prefix: &str, module: &str) -> String {
    format!("{prefix}_{}_dispatch", sanitize_c_identifier(module))
}

/// Per-module method table.
pub fn table_name(prefix: &str, module: &str) -> String {
    format!("{prefix}_{}_methods", sanitize_c_identifier(module))
}

/// Fragments produced for one parameter.
#[derive(Debug, Clone)]
pub struct ParamFragments {
    /// Local declarations.
    pub decls: Vec<CStmt>,
    /// Extraction, presence check, parse and validation.
    pub parse: Vec<CStmt>,
    /// Arguments passed to the implementation hook.
    pub forward: Vec<String>,
    /// Parameter declarators of the implementation hook.
    pub impl_params: Vec<String>,
}

/// Build the fragments for positional parameter `index` of `method`.
pub fn param_fragments(prefix: &str, method: &str, index: usize, field: &ResolvedField) -> ParamFragments {
    let ident = sanitize_c_identifier(&field.name);
    let json = format!("{ident}_json");
    let what = format!("{method}: param '{}'", field.name);
    let c_type = field_c_type(field, false);

    let mut decls = vec![CStmt::Decl {
        declarator: format!("json_t {json}"),
        init: Some(format!("json_at(args, {index})")),
    }];
    let (forward, impl_params) = if field.array {
        decls.push(CStmt::Decl {
            declarator: c_type.declare_array(&ident),
            init: Some("NULL".into()),
        });
        decls.push(CStmt::Decl {
            declarator: format!("uint32_t {ident}_len"),
            init: Some("0".into()),
        });
        (
            vec![ident.clone(), format!("{ident}_len")],
            vec![
                const_array(&c_type, &ident),
                format!("uint32_t {ident}_len"),
            ],
        )
    } else {
        decls.push(CStmt::Decl {
            declarator: c_type.declare(&ident),
            init: Some(c_type.zero().to_string()),
        });
        if c_type.by_reference() {
            (
                vec![format!("&{ident}")],
                vec![format!("const {}* {ident}", c_type.emit())],
            )
        } else {
            (vec![ident.clone()], vec![impl_param(&c_type, &ident)])
        }
    };

    let present = value_stmts(prefix, field, &json, &ident, &what, false);
    let mut parse = Vec::new();
    if field.optional {
        let absent = match (&field.default, &field.kind) {
            (Some(default), FieldKind::Primitive(prim)) if !field.array => {
                prim.default_stmts(default, &ident)
            }
            _ => None,
        };
        parse.push(CStmt::If {
            cond: format!("!json_is_null({json})"),
            then_body: present,
            else_body: absent,
        });
    } else {
        parse.push(CStmt::throw_if(
            format!("json_is_null({json})"),
            format!("{method}: missing required param '{}'", field.name),
        ));
        parse.extend(present);
    }

    ParamFragments {
        decls,
        parse,
        forward,
        impl_params,
    }
}

fn impl_param(c_type: &CType, ident: &str) -> String {
    match c_type {
        CType::Address => format!("const uint8_t {ident}[20]"),
        other => other.declare(ident),
    }
}

fn const_array(c_type: &CType, ident: &str) -> String {
    match c_type {
        CType::Address => format!("const uint8_t (*{ident})[20]"),
        other => format!("const {}", other.declare_array(ident)),
    }
}

/// `#if defined(A) && defined(B)` for a method's build options.
pub fn guard_open(options: &[String]) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    Some(format!(
        "#if {}",
        options
            .iter()
            .map(|o| format!("defined({})", sanitize_c_identifier(o)))
            .collect::<Vec<_>>()
            .join(" && ")
    ))
}

fn guarded(options: &[String], items: Vec<CStmt>) -> Vec<CStmt> {
    match guard_open(options) {
        Some(open) => {
            let mut out = vec![CStmt::Preproc(open)];
            out.extend(items);
            out.push(CStmt::Preproc("#endif".into()));
            out
        }
        None => items,
    }
}

fn guarded_item(options: &[String], item: CItem) -> Vec<CItem> {
    match guard_open(options) {
        Some(open) => vec![CItem::Raw(format!("{open}\n{}#endif", item.emit()))],
        None => vec![item],
    }
}

/// Native output of one group.
#[derive(Debug, Default)]
pub struct ModuleOutput {
    /// Items for `<module>.h`.
    pub header: Vec<CItem>,
    /// Items for `<module>.c`.
    pub source: Vec<CItem>,
    /// Modules whose headers the source needs for alias targets.
    pub alias_modules: Vec<String>,
    /// Methods that got a dispatch entry.
    pub dispatched: Vec<String>,
}

/// Emit handlers, dispatch entries and the dispatch function of a group.
pub fn emit_module(model: &ResolvedModel, group: &ResolvedGroup, prefix: &str) -> ModuleOutput {
    let mut out = ModuleOutput::default();
    let methods: Vec<&ResolvedMethod> = group.methods.iter().filter(|m| !m.skip_generate).collect();

    for method in &methods {
        match &method.alias {
            Some(target) => {
                if let Some(target_method) = model.method(target)
                    && target_method.group != group.name
                    && let Some(target_group) = model.groups.iter().find(|g| g.name == target_method.group)
                    && !out.alias_modules.contains(&target_group.module)
                {
                    out.alias_modules.push(target_group.module.clone());
                }
                let handler = alias_handler(prefix, method, target);
                out.header
                    .extend(guarded_item(&method.cmake_options, CItem::Prototype(handler.clone())));
                out.source
                    .extend(guarded_item(&method.cmake_options, CItem::Function(handler)));
            }
            None => {
                let (hook, handler) = method_handler(prefix, method);
                out.header
                    .extend(guarded_item(&method.cmake_options, CItem::Prototype(hook)));
                out.header
                    .extend(guarded_item(&method.cmake_options, CItem::Prototype(handler.clone())));
                out.source
                    .extend(guarded_item(&method.cmake_options, CItem::Function(handler)));
            }
        }
        out.dispatched.push(method.name.clone());
    }

    // dispatch table
    let mut table = format!("const rpc_method_entry_t {}[] = {{\n", table_name(prefix, &group.module));
    for method in &methods {
        let entry = format!(
            "  {{{}, {}}},\n",
            c_str(&method.name),
            handler_fn(prefix, &method.name)
        );
        match guard_open(&method.cmake_options) {
            Some(open) => table.push_str(&format!("{open}\n{entry}#endif\n")),
            None => table.push_str(&entry),
        }
    }
    table.push_str("  {NULL, NULL},\n};");
    out.header.push(CItem::Raw(format!(
        "extern const rpc_method_entry_t {}[];",
        table_name(prefix, &group.module)
    )));
    out.source.push(CItem::Raw(table));

    let dispatch = dispatch_function(prefix, &group.module, &methods);
    out.header.push(CItem::Prototype(dispatch.clone()));
    out.source.push(CItem::Function(dispatch));
    out
}

fn method_handler(prefix: &str, method: &ResolvedMethod) -> (CFunction, CFunction) {
    let mut body = vec![CStmt::throw_if(
        format!("json_len(args) > {}", method.params.len()),
        format!(
            "{}: expected at most {} argument(s)",
            method.name,
            method.params.len()
        ),
    )];
    let mut forward = vec!["ctx".to_string()];
    let mut hook_params = vec!["rpc_ctx_t* ctx".to_string()];
    let mut parse = Vec::new();

    for (index, param) in method.params.iter().enumerate() {
        let fragments = param_fragments(prefix, &method.name, index, param);
        body.extend(fragments.decls);
        parse.extend(fragments.parse);
        forward.extend(fragments.forward);
        hook_params.extend(fragments.impl_params);
    }
    body.extend(parse);
    if let Some(code) = &method.validation {
        body.push(CStmt::Comment("custom validation".into()));
        body.push(CStmt::Raw(code.trim_end().to_string()));
    }
    body.push(CStmt::Return(Some(format!(
        "{}({})",
        impl_fn(prefix, &method.name),
        forward.join(", ")
    ))));

    let hook = CFunction {
        doc: Some(hook_doc(method)),
        is_static: false,
        ret: "rpc_status_t".into(),
        name: impl_fn(prefix, &method.name),
        params: hook_params,
        body: Vec::new(),
    };
    let handler = CFunction {
        doc: None,
        is_static: false,
        ret: "rpc_status_t".into(),
        name: handler_fn(prefix, &method.name),
        params: vec!["rpc_ctx_t* ctx".into(), "json_t args".into()],
        body,
    };
    (hook, handler)
}

fn hook_doc(method: &ResolvedMethod) -> String {
    let mut doc = if method.descr.is_empty() {
        method.name.clone()
    } else {
        method.descr.trim().to_string()
    };
    for param in &method.params {
        doc.push_str(&format!("\n@param {} {}", param.name, param.type_label()));
    }
    if let Some(result) = &method.result {
        doc.push_str(&format!("\n@return {}", result.type_label()));
    }
    doc
}

fn alias_handler(prefix: &str, method: &ResolvedMethod, target: &str) -> CFunction {
    CFunction {
        doc: Some(format!("Alias of {target}.")),
        is_static: false,
        ret: "rpc_status_t".into(),
        name: handler_fn(prefix, &method.name),
        params: vec!["rpc_ctx_t* ctx".into(), "json_t args".into()],
        body: vec![CStmt::Return(Some(format!(
            "{}(ctx, args)",
            handler_fn(prefix, target)
        )))],
    }
}

fn dispatch_function(prefix: &str, module: &str, methods: &[&ResolvedMethod]) -> CFunction {
    let mut body = Vec::new();
    let shared = common_prefix(methods.iter().map(|m| m.name.as_str()));
    if !shared.is_empty() {
        body.push(CStmt::If {
            cond: format!("strncmp(method, {}, {}) != 0", c_str(&shared), shared.len()),
            then_body: vec![CStmt::Return(Some("RPC_NOT_FOUND".into()))],
            else_body: None,
        });
    }
    for method in methods {
        body.extend(guarded(
            &method.cmake_options,
            vec![CStmt::If {
                cond: format!("strcmp(method, {}) == 0", c_str(&method.name)),
                then_body: vec![CStmt::Return(Some(format!(
                    "{}(ctx, args)",
                    handler_fn(prefix, &method.name)
                )))],
                else_body: None,
            }],
        ));
    }
    body.push(CStmt::Return(Some("RPC_NOT_FOUND".into())));
    CFunction {
        doc: Some(format!("Route a call to a {module} handler, or RPC_NOT_FOUND.")),
        is_static: false,
        ret: "rpc_status_t".into(),
        name: dispatch_fn(prefix, module),
        params: vec![
            "rpc_ctx_t* ctx".into(),
            "const char* method".into(),
            "json_t args".into(),
        ],
        body,
    }
}

// =============================================================================
// Documentation fragments
// =============================================================================

/// Markdown table of a method's params.
pub fn param_table(method: &ResolvedMethod) -> String {
    if method.params.is_empty() {
        return String::new();
    }
    let mut out = String::from("| # | name | type | required | description |\n|---|---|---|---|---|\n");
    for (i, p) in method.params.iter().enumerate() {
        out.push_str(&format!(
            "| {} | `{}` | {} | {} | {} |\n",
            i + 1,
            p.name,
            type_link(p),
            if p.optional { "no" } else { "yes" },
            describe(p).replace('|', "\\|").replace('\n', " ")
        ));
    }
    out
}

/// Description of a method's result.
pub fn returns_text(method: &ResolvedMethod) -> String {
    match &method.result {
        None => "nothing".to_string(),
        Some(r) if r.descr.is_empty() => type_link(r),
        Some(r) => format!("{} - {}", type_link(r), r.descr.trim()),
    }
}

/// Markdown type of a field, linking object types to their section.
pub fn type_link(field: &ResolvedField) -> String {
    match &field.kind {
        FieldKind::Object(name) => {
            let suffix = if field.array { "[]" } else { "" };
            format!("[`{name}{suffix}`](#{})", name.to_ascii_lowercase())
        }
        FieldKind::Primitive(_) => format!("`{}`", field.type_label()),
    }
}

/// Description cell: documentation, allowed values and default.
pub fn describe(field: &ResolvedField) -> String {
    let mut parts = Vec::new();
    if !field.descr.is_empty() {
        parts.push(field.descr.trim().to_string());
    }
    if let Some(values) = &field.enum_values {
        parts.push(format!("one of `{}`", values.join("`, `")));
    }
    if let Some(default) = &field.default {
        parts.push(format!("default `{default}`"));
    }
    parts.join("; ")
}

/// Example request for docs: the cached example, else synthesized from types.
pub fn example_request(model: &ResolvedModel, method: &ResolvedMethod) -> Vec<Value> {
    if let Some(example) = model.example(&method.name) {
        return example.request.clone();
    }
    method
        .params
        .iter()
        .filter(|p| !p.optional)
        .map(|p| sample_value(model, p, 0))
        .collect()
}

/// Example response for docs, if one is known or can be synthesized.
pub fn example_response(model: &ResolvedModel, method: &ResolvedMethod) -> Option<Value> {
    if let Some(example) = model.example(&method.name) {
        return Some(example.response.clone());
    }
    method.result.as_ref().map(|r| sample_value(model, r, 0))
}

fn sample_value(model: &ResolvedModel, field: &ResolvedField, depth: usize) -> Value {
    let element = match &field.kind {
        FieldKind::Primitive(p) => match &field.enum_values {
            Some(values) if !values.is_empty() => Value::String(values[0].clone()),
            _ => p.sample(),
        },
        FieldKind::Object(name) if depth < 3 => {
            let mut object = serde_json::Map::new();
            if let Some(ty) = model.type_def(name) {
                for f in ty.fields.values().filter(|f| !f.optional) {
                    object.insert(f.name.clone(), sample_value(model, f, depth + 1));
                }
            }
            Value::Object(object)
        }
        FieldKind::Object(_) => Value::Null,
    };
    if field.array {
        Value::Array(vec![element])
    } else {
        element
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
  Filter:
    from: uint64
eth:
  eth_getBalance:
    descr: Balance of an account.
    params:
      account: address
      block:
        type: uint64
        optional: true
        default: 5
    result: uint256
  eth_getLogs:
    params:
      filter: Filter
      topics:
        type: bytes32[]
        maxLength: 4
    result: any
    cmakeOptions: [ETH_LOGS]
    validation: |
      if (topics_len == 0) RPC_THROW(ctx, "no topics");
  eth_balance:
    alias: eth_getBalance
  eth_internal:
    skipGenerate: true
"#;

    fn model() -> ResolvedModel {
        let mut ctx = ScanContext::default();
        ctx.add_schema(serde_yaml::from_str::<SchemaFile>(SCHEMA).unwrap());
        ResolvedModel::build(&ctx).unwrap()
    }

    fn render(items: &[CItem]) -> String {
        items.iter().map(Emit::emit).collect()
    }

    #[test]
    fn test_handler_checks_and_forwards_in_order() {
        let model = model();
        let out = emit_module(&model, &model.groups[0], "rpc");
        let source = render(&out.source);
        assert!(source.contains(
            "if (json_len(args) > 2) RPC_THROW(ctx, \"eth_getBalance: expected at most 2 argument(s)\");"
        ));
        assert!(source.contains("json_t account_json = json_at(args, 0);"));
        assert!(source.contains("uint8_t account[20] = {0};"));
        assert!(source.contains(
            "if (json_is_null(account_json)) RPC_THROW(ctx, \"eth_getBalance: missing required param 'account'\");"
        ));
        assert!(source.contains("} else {\n    block = 5;\n  }"));
        assert!(source.contains("return rpc_impl_eth_getBalance(ctx, account, block);"));
    }

    #[test]
    fn test_struct_and_array_params() {
        let model = model();
        let out = emit_module(&model, &model.groups[0], "rpc");
        let source = render(&out.source);
        assert!(source.contains("RPC_TRY(rpc_decode_Filter(ctx, filter_json, &filter));"));
        assert!(source.contains("if (topics_len > 4)"));
        assert!(source.contains("return rpc_impl_eth_getLogs(ctx, &filter, topics, topics_len);"));
        assert!(source.contains("/* custom validation */\n  if (topics_len == 0)"));
        let header = render(&out.header);
        assert!(header.contains(
            "rpc_status_t rpc_impl_eth_getLogs(rpc_ctx_t* ctx, const Filter_t* filter, const bytes_t* topics, uint32_t topics_len);"
        ));
    }

    #[test]
    fn test_alias_forwards_to_target_handler() {
        let model = model();
        let out = emit_module(&model, &model.groups[0], "rpc");
        let source = render(&out.source);
        assert!(source.contains("return rpc_handle_eth_getBalance(ctx, args);"));
        assert!(!source.contains("rpc_impl_eth_balance"));
    }

    #[test]
    fn test_dispatch_prefix_short_circuit_and_guards() {
        let model = model();
        let out = emit_module(&model, &model.groups[0], "rpc");
        let source = render(&out.source);
        assert!(source.contains("if (strncmp(method, \"eth_\", 4) != 0) {\n    return RPC_NOT_FOUND;\n  }"));
        assert!(source.contains("#if defined(ETH_LOGS)\n  if (strcmp(method, \"eth_getLogs\") == 0)"));
        assert!(source.contains("#if defined(ETH_LOGS)\n  {\"eth_getLogs\", rpc_handle_eth_getLogs},\n#endif\n"));
        assert!(!source.contains("eth_internal"));
        assert_eq!(out.dispatched, vec!["eth_getBalance", "eth_getLogs", "eth_balance"]);
    }

    #[test]
    fn test_no_short_circuit_without_shared_prefix() {
        let mut ctx = ScanContext::default();
        ctx.add_schema(serde_yaml::from_str::<SchemaFile>("g:\n  alpha: {}\n  beta: {}\n").unwrap());
        let model = ResolvedModel::build(&ctx).unwrap();
        let out = emit_module(&model, &model.groups[0], "rpc");
        assert!(!render(&out.source).contains("strncmp"));
    }

    #[test]
    fn test_doc_fragments() {
        let model = model();
        let method = model.method("eth_getBalance").unwrap();
        let table = param_table(method);
        assert!(table.contains("| 1 | `account` | `address` | yes |  |"));
        assert!(table.contains("| 2 | `block` | `uint64` | no | default `5` |"));
        assert_eq!(returns_text(method), "`uint256`");
        let request = example_request(&model, method);
        assert_eq!(request.len(), 1);
    }
}
