//! Struct/type emitter.
//!
//! Walks the object types reachable from RPC params and results and emits,
//! once per type per run:
//! - a struct definition (forward typedefs first, so pointers always work)
//! - a decode function dispatching on key length, then `memcmp`
//! - an encode function writing the struct back as JSON
//!
//! Edges that close a cycle on the current walk become pointer fields.

use std::collections::HashSet;

use rpcgen_common::sanitize_c_identifier;

use super::c::{CCase, CFunction, CItem, CStmt, CStruct, CType, c_str};
use crate::error::{GenError, Result};
use crate::primitive::length_checks;
use crate::registry::{FieldKind, ResolvedField, ResolvedType};
use crate::resolved::ResolvedModel;

/// Typedef name of a generated struct.
pub fn struct_name(type_name: &str) -> String {
    format!("{}_t", sanitize_c_identifier(type_name))
}

/// Decode function of a generated struct.
pub fn decode_fn(prefix: &str, type_name: &str) -> String {
    format!("{prefix}_decode_{}", sanitize_c_identifier(type_name))
}

/// Encode function of a generated struct.
pub fn encode_fn(prefix: &str, type_name: &str) -> String {
    format!("{prefix}_encode_{}", sanitize_c_identifier(type_name))
}

/// Emitted struct items, split by file.
#[derive(Debug, Default)]
pub struct StructOutput {
    /// Forward typedefs, struct definitions and prototypes.
    pub header: Vec<CItem>,
    /// Decode and encode definitions.
    pub source: Vec<CItem>,
    /// Emitted type names in emission order.
    pub emitted: Vec<String>,
}

/// Per-run struct emitter.
#[derive(Debug)]
pub struct StructEmitter<'m> {
    model: &'m ResolvedModel,
    prefix: String,
    emitted: HashSet<String>,
    on_stack: Vec<String>,
    pointer_fields: HashSet<(String, String)>,
    order: Vec<String>,
}

impl<'m> StructEmitter<'m> {
    /// Emitter over `model` using symbol `prefix`.
    pub fn new(model: &'m ResolvedModel, prefix: &str) -> Self {
        Self {
            model,
            prefix: prefix.to_string(),
            emitted: HashSet::new(),
            on_stack: Vec::new(),
            pointer_fields: HashSet::new(),
            order: Vec::new(),
        }
    }

    /// Visit a type and everything it reaches. Repeat visits are no-ops.
    pub fn visit(&mut self, type_name: &str) -> Result<()> {
        if self.emitted.contains(type_name) {
            return Ok(());
        }
        let model = self.model;
        let ty = model.type_def(type_name).ok_or_else(|| {
            GenError::backend("native", format!("type '{type_name}' was never resolved"))
        })?;

        self.on_stack.push(type_name.to_string());
        for field in ty.fields.values() {
            let FieldKind::Object(child) = &field.kind else {
                continue;
            };
            if self.on_stack.iter().any(|n| n == child) {
                if !field.array {
                    self.pointer_fields
                        .insert((type_name.to_string(), field.name.clone()));
                }
                continue;
            }
            self.visit(child)?;
        }
        self.on_stack.pop();

        self.emitted.insert(type_name.to_string());
        self.order.push(type_name.to_string());
        Ok(())
    }

    /// Visit every type reachable from every method, then any left over.
    pub fn visit_all(&mut self) -> Result<()> {
        let model = self.model;
        for method in model.methods().filter(|m| m.alias.is_none()) {
            for field in method.params.iter().chain(method.result.iter()) {
                if let Some(name) = field.object() {
                    self.visit(name)?;
                }
            }
        }
        for name in model.types.keys() {
            self.visit(name)?;
        }
        Ok(())
    }

    /// Whether `owner.field` is emitted as a pointer.
    pub fn is_pointer(&self, owner: &str, field: &str) -> bool {
        self.pointer_fields
            .contains(&(owner.to_string(), field.to_string()))
    }

    /// Produce header and source items for everything visited.
    pub fn finish(self) -> Result<StructOutput> {
        let mut out = StructOutput::default();
        let model = self.model;

        for name in &self.order {
            out.header.push(CItem::Raw(format!(
                "typedef struct {}_s {};",
                sanitize_c_identifier(name),
                struct_name(name)
            )));
        }

        for name in &self.order {
            let ty = model.type_def(name).ok_or_else(|| {
                GenError::backend("native", format!("type '{name}' was never resolved"))
            })?;
            out.header.push(CItem::Struct(self.struct_def(ty)));
            let decode = self.decode_def(ty);
            let encode = self.encode_def(ty);
            out.header.push(CItem::Prototype(decode.clone()));
            out.header.push(CItem::Prototype(encode.clone()));
            out.source.push(CItem::Function(decode));
            out.source.push(CItem::Function(encode));
        }
        out.emitted = self.order;
        Ok(out)
    }

    fn struct_def(&self, ty: &ResolvedType) -> CStruct {
        let mut fields = Vec::new();
        for field in ty.fields.values() {
            let ident = sanitize_c_identifier(&field.name);
            let comment = (!field.descr.is_empty()).then(|| field.descr.clone());
            let c_type = field_c_type(field, self.is_pointer(&ty.name, &field.name));
            if field.array {
                fields.push((c_type.declare_array(&ident), comment));
                fields.push((format!("uint32_t {ident}_len"), None));
            } else {
                fields.push((c_type.declare(&ident), comment));
            }
        }
        CStruct {
            doc: None,
            name: struct_name(&ty.name),
            fields,
        }
    }

    fn decode_def(&self, ty: &ResolvedType) -> CFunction {
        let mut body = Vec::new();
        for field in ty.fields.values() {
            body.push(CStmt::Decl {
                declarator: format!("bool seen_{}", sanitize_c_identifier(&field.name)),
                init: Some("false".into()),
            });
        }
        body.push(CStmt::throw_if(
            "!json_is_object(json)",
            format!("{}: expected object", ty.name),
        ));
        body.push(CStmt::Expr("memset(out, 0, sizeof(*out))".into()));

        if !ty.fields.is_empty() {
            body.push(CStmt::Block {
                head: "json_for_each_entry(json, key, val)".into(),
                body: vec![CStmt::Switch {
                    expr: "key.len".into(),
                    cases: self.key_cases(ty),
                }],
            });
        }

        for field in ty.fields.values() {
            let ident = sanitize_c_identifier(&field.name);
            if !field.optional {
                body.push(CStmt::throw_if(
                    format!("!seen_{ident}"),
                    format!("missing required field '{}' in {}", field.name, ty.name),
                ));
            } else if let (Some(default), FieldKind::Primitive(prim)) = (&field.default, &field.kind)
                && !field.array
                && let Some(assign) = prim.default_stmts(default, &format!("out->{ident}"))
            {
                body.push(CStmt::If {
                    cond: format!("!seen_{ident}"),
                    then_body: assign,
                    else_body: None,
                });
            }
        }
        body.push(CStmt::Return(Some("RPC_OK".into())));

        CFunction {
            doc: Some(format!("Decode a JSON object into {}.", struct_name(&ty.name))),
            is_static: false,
            ret: "rpc_status_t".into(),
            name: decode_fn(&self.prefix, &ty.name),
            params: vec![
                "rpc_ctx_t* ctx".into(),
                "json_t json".into(),
                format!("{}* out", struct_name(&ty.name)),
            ],
            body,
        }
    }

    fn key_cases(&self, ty: &ResolvedType) -> Vec<CCase> {
        // group fields by key length, stable in declaration order
        let mut by_len: Vec<(usize, Vec<&ResolvedField>)> = Vec::new();
        for field in ty.fields.values() {
            let len = field.name.len();
            match by_len.iter_mut().find(|(l, _)| *l == len) {
                Some((_, group)) => group.push(field),
                None => by_len.push((len, vec![field])),
            }
        }
        by_len.sort_by_key(|(len, _)| *len);

        by_len
            .into_iter()
            .map(|(len, fields)| CCase {
                label: len.to_string(),
                body: fields
                    .into_iter()
                    .map(|field| {
                        let ident = sanitize_c_identifier(&field.name);
                        let what = format!("field '{}' in {}", field.name, ty.name);
                        let mut then_body = vec![CStmt::If {
                            cond: "json_is_null(val)".into(),
                            then_body: vec![CStmt::Continue],
                            else_body: None,
                        }];
                        then_body.extend(value_stmts(
                            &self.prefix,
                            field,
                            "val",
                            &format!("out->{ident}"),
                            &what,
                            self.is_pointer(&ty.name, &field.name),
                        ));
                        then_body.push(CStmt::Expr(format!("seen_{ident} = true")));
                        then_body.push(CStmt::Continue);
                        CStmt::If {
                            cond: format!(
                                "memcmp(key.data, {}, {len}) == 0",
                                c_str(&field.name)
                            ),
                            then_body,
                            else_body: None,
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    fn encode_def(&self, ty: &ResolvedType) -> CFunction {
        let mut body = vec![CStmt::Expr("rpc_json_begin_object(buf)".into())];
        for field in ty.fields.values() {
            let ident = sanitize_c_identifier(&field.name);
            body.push(CStmt::Expr(format!("rpc_json_key(buf, {})", c_str(&field.name))));
            body.extend(encode_value_stmts(
                &self.prefix,
                field,
                &format!("value->{ident}"),
                self.is_pointer(&ty.name, &field.name),
            ));
        }
        body.push(CStmt::Expr("rpc_json_end_object(buf)".into()));

        CFunction {
            doc: None,
            is_static: false,
            ret: "void".into(),
            name: encode_fn(&self.prefix, &ty.name),
            params: vec![
                "rpc_buffer_t* buf".into(),
                format!("const {}* value", struct_name(&ty.name)),
            ],
            body,
        }
    }
}

/// Native element type of a field.
pub fn field_c_type(field: &ResolvedField, pointer: bool) -> CType {
    match &field.kind {
        FieldKind::Primitive(p) => p.c_type(),
        FieldKind::Object(name) if pointer => CType::Ptr(Box::new(CType::Named(struct_name(name)))),
        FieldKind::Object(name) => CType::Named(struct_name(name)),
    }
}

/// Parse JSON `src` into lvalue `dst` (plus `<dst>_len` for arrays) and validate it.
pub fn value_stmts(
    prefix: &str,
    field: &ResolvedField,
    src: &str,
    dst: &str,
    what: &str,
    pointer: bool,
) -> Vec<CStmt> {
    if !field.array {
        return element_stmts(prefix, field, src, dst, what, pointer);
    }
    let len = format!("{dst}_len");
    let mut out = vec![
        CStmt::throw_if(format!("!json_is_array({src})"), format!("{what}: expected array")),
        CStmt::Expr(format!("{len} = json_len({src})")),
    ];
    out.extend(length_checks(&len, field, what));
    out.push(CStmt::Expr(format!("{dst} = rpc_alloc(ctx, {len} * sizeof(*{dst}))")));
    let mut loop_body = vec![CStmt::Decl {
        declarator: "json_t item".into(),
        init: Some(format!("json_at({src}, i)")),
    }];
    loop_body.extend(element_stmts(prefix, field, "item", &format!("{dst}[i]"), what, false));
    out.push(CStmt::Block {
        head: format!("for (uint32_t i = 0; i < {len}; i++)"),
        body: loop_body,
    });
    out
}

fn element_stmts(
    prefix: &str,
    field: &ResolvedField,
    src: &str,
    dst: &str,
    what: &str,
    pointer: bool,
) -> Vec<CStmt> {
    match &field.kind {
        FieldKind::Primitive(prim) => {
            let mut out = prim.parse_stmts(field, src, dst, what);
            out.extend(prim.validation_stmts(field, dst, what));
            out
        }
        FieldKind::Object(name) if pointer => vec![
            CStmt::Expr(format!("{dst} = rpc_alloc(ctx, sizeof({}))", struct_name(name))),
            CStmt::Expr(format!("RPC_TRY({}(ctx, {src}, {dst}))", decode_fn(prefix, name))),
        ],
        FieldKind::Object(name) => vec![CStmt::Expr(format!(
            "RPC_TRY({}(ctx, {src}, &{dst}))",
            decode_fn(prefix, name)
        ))],
    }
}

/// Write lvalue `src` as JSON into `buf`.
pub fn encode_value_stmts(prefix: &str, field: &ResolvedField, src: &str, pointer: bool) -> Vec<CStmt> {
    if !field.array {
        return encode_element_stmts(prefix, field, src, pointer);
    }
    let mut loop_body = Vec::new();
    loop_body.extend(encode_element_stmts(prefix, field, &format!("{src}[i]"), false));
    vec![
        CStmt::Expr("rpc_json_begin_array(buf)".into()),
        CStmt::Block {
            head: format!("for (uint32_t i = 0; i < {src}_len; i++)"),
            body: loop_body,
        },
        CStmt::Expr("rpc_json_end_array(buf)".into()),
    ]
}

fn encode_element_stmts(prefix: &str, field: &ResolvedField, src: &str, pointer: bool) -> Vec<CStmt> {
    match &field.kind {
        FieldKind::Primitive(prim) => {
            let writer = match prim.c_type() {
                CType::Bool => "rpc_json_add_bool",
                CType::U32 => "rpc_json_add_u32",
                CType::I32 => "rpc_json_add_i32",
                CType::U64 => "rpc_json_add_u64",
                CType::I64 => "rpc_json_add_i64",
                CType::Double => "rpc_json_add_double",
                CType::Str => "rpc_json_add_string",
                CType::Address => "rpc_json_add_address",
                CType::Json => "rpc_json_add_json",
                CType::Bytes if prim.int_repr().is_some() => "rpc_json_add_uint_bytes",
                _ => "rpc_json_add_bytes",
            };
            vec![CStmt::Expr(format!("{writer}(buf, {src})"))]
        }
        FieldKind::Object(name) if pointer => vec![CStmt::If {
            cond: format!("{src} == NULL"),
            then_body: vec![CStmt::Expr("rpc_json_add_null(buf)".into())],
            else_body: Some(vec![CStmt::Expr(format!(
                "{}(buf, {src})",
                encode_fn(prefix, name)
            ))]),
        }],
        FieldKind::Object(name) => vec![CStmt::Expr(format!("{}(buf, &{src})", encode_fn(prefix, name)))],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::ScanContext;
    use crate::emit::c::Emit;
    use crate::model::SchemaFile;

    fn model(yaml: &str) -> ResolvedModel {
        let mut ctx = ScanContext::default();
        ctx.add_schema(serde_yaml::from_str::<SchemaFile>(yaml).unwrap());
        ResolvedModel::build(&ctx).unwrap()
    }

    fn render(items: &[CItem]) -> String {
        items.iter().map(Emit::emit).collect()
    }

    const SCHEMA: &str = r#"
types:
  Cursor:
    offset: uint32
    limit:
      type: uint32
      optional: true
      default: 10
  Page:
    cursor: Cursor
    items: Entry[]
  Entry:
    id: uint64
    to: address
    note:
      type: string
      optional: true
g:
  list:
    params:
      page: Page
  next:
    params:
      cursor: Cursor
"#;

    #[test]
    fn test_each_type_emitted_once_children_first() {
        let model = model(SCHEMA);
        let mut emitter = StructEmitter::new(&model, "rpc");
        emitter.visit_all().unwrap();
        emitter.visit("Cursor").unwrap();
        let out = emitter.finish().unwrap();
        assert_eq!(out.emitted, vec!["Cursor", "Entry", "Page"]);
        let header = render(&out.header);
        assert_eq!(header.matches("struct Cursor_s {").count(), 1);
        assert!(header.contains("  Entry_t* items;\n  uint32_t items_len;\n"));
    }

    #[test]
    fn test_decode_switches_on_key_length() {
        let model = model(SCHEMA);
        let mut emitter = StructEmitter::new(&model, "rpc");
        emitter.visit("Entry").unwrap();
        let source = render(&emitter.finish().unwrap().source);
        assert!(source.contains("switch (key.len) {"));
        assert!(source.contains("case 2:"));
        assert!(source.contains("memcmp(key.data, \"id\", 2) == 0"));
        assert!(source.contains("memcmp(key.data, \"to\", 2) == 0"));
        assert!(source.contains("json_as_address(val, out->to)"));
    }

    #[test]
    fn test_required_fields_checked_after_loop() {
        let model = model(SCHEMA);
        let mut emitter = StructEmitter::new(&model, "rpc");
        emitter.visit("Page").unwrap();
        let source = render(&emitter.finish().unwrap().source);
        let loop_end = source.find("if (!seen_cursor)").unwrap();
        let loop_start = source.find("json_for_each_entry").unwrap();
        assert!(loop_end > loop_start);
        assert!(source.contains("RPC_THROW(ctx, \"missing required field 'cursor' in Page\")"));
        assert!(!source.contains("missing required field 'note'"));
    }

    #[test]
    fn test_optional_default_applied_when_unseen() {
        let model = model(SCHEMA);
        let mut emitter = StructEmitter::new(&model, "rpc");
        emitter.visit("Cursor").unwrap();
        let source = render(&emitter.finish().unwrap().source);
        assert!(source.contains("if (!seen_limit) {\n    out->limit = 10;\n  }"));
    }

    #[test]
    fn test_recursive_edge_becomes_pointer() {
        let model = model(
            r#"
types:
  Node:
    value: uint32
    next:
      type: Node
      optional: true
    children: Node[]
g:
  walk:
    params:
      root: Node
"#,
        );
        let mut emitter = StructEmitter::new(&model, "rpc");
        emitter.visit_all().unwrap();
        assert!(emitter.is_pointer("Node", "next"));
        assert!(!emitter.is_pointer("Node", "children"));
        let out = emitter.finish().unwrap();
        let header = render(&out.header);
        assert!(header.contains("typedef struct Node_s Node_t;"));
        assert!(header.contains("  Node_t* next;\n"));
        let source = render(&out.source);
        assert!(source.contains("out->next = rpc_alloc(ctx, sizeof(Node_t));"));
        assert!(source.contains("RPC_TRY(rpc_decode_Node(ctx, val, out->next));"));
    }

    #[test]
    fn test_mutual_recursion_breaks_one_edge() {
        let model = model(
            "types:\n  A:\n    b: B\n  B:\n    a:\n      type: A\n      optional: true\ng:\n  m:\n    params:\n      a: A\n",
        );
        let mut emitter = StructEmitter::new(&model, "rpc");
        emitter.visit_all().unwrap();
        assert!(emitter.is_pointer("B", "a"));
        assert!(!emitter.is_pointer("A", "b"));
        assert_eq!(emitter.finish().unwrap().emitted, vec!["B", "A"]);
    }
}
