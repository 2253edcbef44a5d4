//! Swift backend: one `<Module>Api.swift` per group.
//!
//! Each file holds the value types first reached by its group (dependencies
//! before dependents), a caller protocol and a client class that calls
//! through the `RpcTransport` protocol of the runtime package. Types and
//! enums shared by several groups are emitted once, in the first file that
//! reaches them, since every file lands in the same Swift module.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use rpcgen_common::{escape_swift_string, sanitize_swift_identifier, to_pascal_case};
use tracing::debug;

use super::{Backend, FileSet, GENERATED_BANNER};
use crate::error::{GenError, Result};
use crate::registry::{FieldKind, ResolvedField, ResolvedType};
use crate::resolved::{ResolvedGroup, ResolvedMethod, ResolvedModel};

/// Swift class name of a group, `eth` -> `EthApi`.
pub fn class_name(module: &str) -> String {
    let base = to_pascal_case(module);
    if base.ends_with("Api") {
        base
    } else {
        format!("{base}Api")
    }
}

/// Swift method name of an RPC method.
pub fn method_ident(name: &str) -> String {
    sanitize_swift_identifier(name)
}

/// Swift name of a registered type.
pub fn type_ident(name: &str) -> String {
    to_pascal_case(name)
}

fn bare(ident: &str) -> &str {
    ident.trim_matches('`')
}

fn format_doc(doc: &str, indent: &str) -> String {
    doc.trim()
        .lines()
        .map(|line| {
            if line.is_empty() {
                format!("{indent}///\n")
            } else {
                format!("{indent}/// {line}\n")
            }
        })
        .collect()
}

/// Emits `swift/*.swift`.
#[derive(Debug, Clone)]
pub struct SwiftBackend {
    module: String,
}

impl SwiftBackend {
    /// Backend for the Swift module `module`.
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
        }
    }
}

impl Backend for SwiftBackend {
    fn name(&self) -> &'static str {
        "swift"
    }

    fn emit(&self, model: &ResolvedModel) -> Result<FileSet> {
        let mut files = FileSet::new();
        let mut state = ModuleState::new(model);
        for group in &model.groups {
            let methods: Vec<&ResolvedMethod> =
                group.methods.iter().filter(|m| !m.skip_api).collect();
            if methods.is_empty() {
                debug!(group = %group.name, "no api methods, skipping swift file");
                continue;
            }
            let body = GroupWriter {
                model,
                state: &mut state,
                enum_decls: Vec::new(),
            }
            .render(group, &methods)?;
            let mut out = format!("// {GENERATED_BANNER}\n// Module: {}\n\nimport Foundation\n\n", self.module);
            out.push_str(&body);
            files.insert(format!("swift/{}.swift", class_name(&group.module)), out);
        }
        Ok(files)
    }
}

/// Names already claimed in the Swift module.
#[derive(Debug)]
struct ModuleState {
    emitted_types: HashSet<String>,
    enums: IndexMap<Vec<String>, String>,
    type_names: HashSet<String>,
}

impl ModuleState {
    fn new(model: &ResolvedModel) -> Self {
        Self {
            emitted_types: HashSet::new(),
            enums: IndexMap::new(),
            type_names: model.types.keys().map(|n| type_ident(n)).collect(),
        }
    }

    fn is_taken(&self, name: &str) -> bool {
        self.type_names.contains(name) || self.enums.values().any(|n| n == name)
    }
}

struct GroupWriter<'a> {
    model: &'a ResolvedModel,
    state: &'a mut ModuleState,
    enum_decls: Vec<String>,
}

impl GroupWriter<'_> {
    fn render(mut self, group: &ResolvedGroup, methods: &[&ResolvedMethod]) -> Result<String> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        for method in methods {
            for field in method.params.iter().chain(method.result.iter()) {
                if let Some(name) = field.object() {
                    self.collect(name, &mut visited, &mut order);
                }
            }
        }

        let model = self.model;
        let mut types = String::new();
        for name in order {
            if !self.state.emitted_types.insert(name.clone()) {
                continue;
            }
            let ty = model.type_def(&name).ok_or_else(|| {
                GenError::backend("swift", format!("type '{name}' was never resolved"))
            })?;
            types.push_str(&self.render_type(ty)?);
        }

        let client = self.render_client(group, methods)?;

        let mut out = String::new();
        for decl in &self.enum_decls {
            out.push_str(decl);
        }
        out.push_str(&types);
        out.push_str(&client);
        Ok(out)
    }

    /// Depth-first walk pushing each type after everything it contains.
    fn collect(&self, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        if let Some(ty) = self.model.type_def(name) {
            for field in ty.fields.values() {
                if let Some(child) = field.object() {
                    self.collect(child, visited, order);
                }
            }
        }
        order.push(name.to_string());
    }

    fn is_recursive(&self, name: &str) -> bool {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = vec![name];
        while let Some(current) = stack.pop() {
            let Some(ty) = self.model.type_def(current) else {
                continue;
            };
            for child in ty.fields.values().filter_map(ResolvedField::object) {
                if child == name {
                    return true;
                }
                if seen.insert(child) {
                    stack.push(child);
                }
            }
        }
        false
    }

    fn field_type(&mut self, owner: &str, field: &ResolvedField, path: &str) -> Result<String> {
        let base = match &field.kind {
            FieldKind::Object(name) => type_ident(name),
            FieldKind::Primitive(prim) => {
                let swift = prim.swift_type().ok_or_else(|| {
                    GenError::backend(
                        "swift",
                        format!("{path} has type 'any', which has no Swift mapping"),
                    )
                })?;
                match &field.enum_values {
                    Some(values) if swift == "String" && !values.is_empty() => {
                        self.enum_type(owner, &field.name, values)
                    }
                    _ => swift.to_string(),
                }
            }
        };
        let ty = if field.array { format!("[{base}]") } else { base };
        Ok(if field.optional { format!("{ty}?") } else { ty })
    }

    fn enum_type(&mut self, owner: &str, field: &str, values: &[String]) -> String {
        if let Some(name) = self.state.enums.get(values) {
            return name.clone();
        }
        let mut name = to_pascal_case(field);
        if self.state.is_taken(&name) {
            name = format!("{}{}", to_pascal_case(owner), name);
        }
        if self.state.is_taken(&name) {
            let base = name.clone();
            let mut suffix = 2;
            while self.state.is_taken(&name) {
                name = format!("{base}{suffix}");
                suffix += 1;
            }
        }

        let mut decl = format!("public enum {name}: String, Codable, Sendable {{\n");
        for value in values {
            let case = sanitize_swift_identifier(value);
            if bare(&case) == value {
                decl.push_str(&format!("    case {case}\n"));
            } else {
                decl.push_str(&format!(
                    "    case {case} = \"{}\"\n",
                    escape_swift_string(value)
                ));
            }
        }
        decl.push_str("}\n\n");
        self.enum_decls.push(decl);
        self.state.enums.insert(values.to_vec(), name.clone());
        name
    }

    fn render_type(&mut self, ty: &ResolvedType) -> Result<String> {
        let name = type_ident(&ty.name);
        let mut members = Vec::new();
        for field in ty.fields.values() {
            let swift = self.field_type(&ty.name, field, &format!("{}.{}", ty.name, field.name))?;
            members.push((field, sanitize_swift_identifier(&field.name), swift));
        }

        let mut out = String::new();
        if self.is_recursive(&ty.name) {
            out.push_str(&format!("public final class {name}: Codable {{\n"));
        } else {
            out.push_str(&format!("public struct {name}: Codable, Sendable {{\n"));
        }
        for (field, ident, swift) in &members {
            if !field.descr.is_empty() {
                out.push_str(&format_doc(&field.descr, "    "));
            }
            out.push_str(&format!("    public var {ident}: {swift}\n"));
        }
        out.push('\n');

        let args: Vec<String> = members
            .iter()
            .map(|(field, ident, swift)| {
                if field.optional {
                    format!("{ident}: {swift} = nil")
                } else {
                    format!("{ident}: {swift}")
                }
            })
            .collect();
        out.push_str(&format!("    public init({}) {{\n", args.join(", ")));
        for (_, ident, _) in &members {
            out.push_str(&format!("        self.{} = {ident}\n", bare(ident)));
        }
        out.push_str("    }\n");

        if members.iter().any(|(field, ident, _)| bare(ident) != field.name) {
            out.push_str("\n    enum CodingKeys: String, CodingKey {\n");
            for (field, ident, _) in &members {
                if bare(ident) == field.name {
                    out.push_str(&format!("        case {ident}\n"));
                } else {
                    out.push_str(&format!(
                        "        case {ident} = \"{}\"\n",
                        escape_swift_string(&field.name)
                    ));
                }
            }
            out.push_str("    }\n");
        }
        out.push_str("}\n\n");
        Ok(out)
    }

    fn render_client(&mut self, group: &ResolvedGroup, methods: &[&ResolvedMethod]) -> Result<String> {
        let class = class_name(&group.module);
        let visible: HashMap<&str, &ResolvedMethod> =
            methods.iter().map(|m| (m.name.as_str(), *m)).collect();

        let mut requirements = String::new();
        let mut impls = String::new();
        for method in methods {
            let sig = self.signature(method)?;
            requirements.push_str(&format_doc(&sig.doc, "    "));
            requirements.push_str(&format!("    {}\n", sig.declaration(false)));

            impls.push('\n');
            impls.push_str(&format_doc(&sig.doc, "    "));
            impls.push_str(&format!("    public {} {{\n", sig.declaration(true)));
            let call = match method.alias.as_deref() {
                Some(target) if visible.contains_key(target) => {
                    let labels: Vec<String> = sig
                        .params
                        .iter()
                        .map(|(ident, _, _)| format!("{}: {ident}", bare(ident)))
                        .collect();
                    format!("try await {}({})", method_ident(target), labels.join(", "))
                }
                target => {
                    let rpc_name = target.unwrap_or(&method.name);
                    let args: Vec<&str> = sig.params.iter().map(|(ident, _, _)| ident.as_str()).collect();
                    let verb = if sig.result.is_some() { "call" } else { "callVoid" };
                    format!(
                        "try await transport.{verb}(\"{}\", params: [{}])",
                        escape_swift_string(rpc_name),
                        args.join(", ")
                    )
                }
            };
            if sig.result.is_some() {
                impls.push_str(&format!("        return {call}\n"));
            } else {
                impls.push_str(&format!("        {call}\n"));
            }
            impls.push_str("    }\n");
        }

        let mut out = String::new();
        if !group.descr.is_empty() {
            out.push_str(&format_doc(&group.descr, ""));
        }
        out.push_str(&format!("public protocol {class}Caller {{\n"));
        out.push_str(&requirements);
        out.push_str("}\n\n");

        if !group.descr.is_empty() {
            out.push_str(&format_doc(&group.descr, ""));
        }
        out.push_str(&format!("public final class {class}: {class}Caller {{\n"));
        out.push_str("    private let transport: any RpcTransport\n\n");
        out.push_str("    public init(transport: any RpcTransport) {\n");
        out.push_str("        self.transport = transport\n");
        out.push_str("    }\n");
        out.push_str(&impls);
        out.push_str("}\n");
        Ok(out)
    }

    fn signature(&mut self, method: &ResolvedMethod) -> Result<Signature> {
        let owner = method.alias.as_deref().unwrap_or(&method.name);
        let mut params = Vec::new();
        for param in &method.params {
            let path = format!("{}.{}.{}", method.group, method.name, param.name);
            let swift = self.field_type(owner, param, &path)?;
            params.push((sanitize_swift_identifier(&param.name), swift, param.optional));
        }
        let result = match &method.result {
            Some(result) => {
                let path = format!("{}.{}.result", method.group, method.name);
                Some(self.field_type(&format!("{owner}_result"), result, &path)?)
            }
            None => None,
        };

        let mut doc = if method.descr.is_empty() {
            match &method.alias {
                Some(target) => format!("Alias of `{target}`."),
                None => format!("Calls `{}`.", method.name),
            }
        } else {
            method.descr.trim().to_string()
        };
        let documented: Vec<&ResolvedField> =
            method.params.iter().filter(|p| !p.descr.is_empty()).collect();
        if !documented.is_empty() {
            doc.push_str("\n\n- Parameters:");
            for p in documented {
                doc.push_str(&format!(
                    "\n  - {}: {}",
                    bare(&sanitize_swift_identifier(&p.name)),
                    p.descr.trim().replace('\n', " ")
                ));
            }
        }
        if let Some(r) = method.result.as_ref().filter(|r| !r.descr.is_empty()) {
            doc.push_str(&format!("\n- Returns: {}", r.descr.trim().replace('\n', " ")));
        }

        Ok(Signature {
            name: method_ident(&method.name),
            params,
            result,
            doc,
        })
    }
}

struct Signature {
    name: String,
    /// `(ident, swift type, optional)`
    params: Vec<(String, String, bool)>,
    result: Option<String>,
    doc: String,
}

impl Signature {
    fn declaration(&self, with_defaults: bool) -> String {
        let args: Vec<String> = self
            .params
            .iter()
            .map(|(ident, swift, optional)| {
                if with_defaults && *optional {
                    format!("{ident}: {swift} = nil")
                } else {
                    format!("{ident}: {swift}")
                }
            })
            .collect();
        match &self.result {
            Some(result) => format!(
                "func {}({}) async throws -> {result}",
                self.name,
                args.join(", ")
            ),
            None => format!("func {}({}) async throws", self.name, args.join(", ")),
        }
    }
}
