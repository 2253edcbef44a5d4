//! Native backend: C handler stubs, structs and dispatch tables.

use rpcgen_common::sanitize_c_identifier;
use tracing::debug;

use super::{Backend, FileSet, GENERATED_BANNER};
use crate::emit::c::{CFunction, CItem, CStmt};
use crate::emit::rpc::{dispatch_fn, table_name};
use crate::emit::{CFile, Emit, StructEmitter, emit_module};
use crate::error::Result;
use crate::resolved::ResolvedModel;

/// Runtime header every generated file builds against.
pub const RUNTIME_HEADER: &str = "rpc_runtime.h";

const TYPES_STEM: &str = "rpc_types";
const DISPATCH_STEM: &str = "rpc_dispatch";

/// Emits `native/*.h` and `native/*.c`.
#[derive(Debug, Clone)]
pub struct NativeBackend {
    prefix: String,
}

impl NativeBackend {
    /// Backend emitting symbols with `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn guard(&self, stem: &str) -> String {
        format!(
            "{}_{}_H",
            self.prefix.to_ascii_uppercase(),
            sanitize_c_identifier(stem).to_ascii_uppercase()
        )
    }

    fn header(&self, stem: &str, includes: Vec<String>, items: Vec<CItem>) -> String {
        CFile {
            guard: Some(self.guard(stem)),
            banner: GENERATED_BANNER.to_string(),
            includes,
            items,
        }
        .emit()
    }

    fn source(includes: Vec<String>, items: Vec<CItem>) -> String {
        CFile {
            guard: None,
            banner: GENERATED_BANNER.to_string(),
            includes,
            items,
        }
        .emit()
    }

    fn dispatch_header(&self, modules: &[String]) -> String {
        let mut tables = String::from("static const rpc_method_entry_t* const ");
        tables.push_str(&format!("{}_method_tables[] = {{\n", self.prefix));
        for module in modules {
            tables.push_str(&format!("  {},\n", table_name(&self.prefix, module)));
        }
        tables.push_str("  NULL,\n};");

        let mut body = vec![CStmt::Decl {
            declarator: "rpc_status_t status".into(),
            init: Some("RPC_NOT_FOUND".into()),
        }];
        for module in modules {
            body.push(CStmt::Expr(format!(
                "status = {}(ctx, method, args)",
                dispatch_fn(&self.prefix, module)
            )));
            body.push(CStmt::If {
                cond: "status != RPC_NOT_FOUND".into(),
                then_body: vec![CStmt::Return(Some("status".into()))],
                else_body: None,
            });
        }
        body.push(CStmt::Return(Some("status".into())));

        let dispatch = CFunction {
            doc: Some("Route a call to whichever module knows the method.".into()),
            is_static: true,
            ret: "inline rpc_status_t".into(),
            name: format!("{}_dispatch", self.prefix),
            params: vec![
                "rpc_ctx_t* ctx".into(),
                "const char* method".into(),
                "json_t args".into(),
            ],
            body,
        };

        let includes = std::iter::once(quoted(RUNTIME_HEADER))
            .chain(modules.iter().map(|m| quoted(&format!("{m}.h"))))
            .collect();
        self.header(
            DISPATCH_STEM,
            includes,
            vec![CItem::Raw(tables), CItem::Function(dispatch)],
        )
    }
}

fn quoted(file: &str) -> String {
    format!("\"{file}\"")
}

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn emit(&self, model: &ResolvedModel) -> Result<FileSet> {
        let mut files = FileSet::new();

        let mut structs = StructEmitter::new(model, &self.prefix);
        structs.visit_all()?;
        let structs = structs.finish()?;
        debug!(types = structs.emitted.len(), "native structs");
        files.insert(
            format!("native/{TYPES_STEM}.h"),
            self.header(TYPES_STEM, vec![quoted(RUNTIME_HEADER)], structs.header),
        );
        files.insert(
            format!("native/{TYPES_STEM}.c"),
            Self::source(
                vec![quoted(&format!("{TYPES_STEM}.h")), "<string.h>".into()],
                structs.source,
            ),
        );

        let mut modules = Vec::new();
        for group in &model.groups {
            let out = emit_module(model, group, &self.prefix);
            if out.dispatched.is_empty() {
                debug!(group = %group.name, "no native methods, skipping module");
                continue;
            }
            let module = sanitize_c_identifier(&group.module);
            let mut source_includes = vec![quoted(&format!("{module}.h")), "<string.h>".into()];
            source_includes.extend(
                out.alias_modules
                    .iter()
                    .map(|m| quoted(&format!("{}.h", sanitize_c_identifier(m)))),
            );
            files.insert(
                format!("native/{module}.h"),
                self.header(
                    &module,
                    vec![quoted(RUNTIME_HEADER), quoted(&format!("{TYPES_STEM}.h"))],
                    out.header,
                ),
            );
            files.insert(
                format!("native/{module}.c"),
                Self::source(source_includes, out.source),
            );
            debug!(group = %group.name, methods = out.dispatched.len(), "native module");
            modules.push(module);
        }

        files.insert(
            format!("native/{DISPATCH_STEM}.h"),
            self.dispatch_header(&modules),
        );
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
    value: uint256
eth:
  _module: eth_api
  eth_getBalance:
    params:
      account: address
    result: uint256
  eth_send:
    params:
      tx: Tx
net:
  net_balance:
    alias: eth_getBalance
  net_hidden:
    skipGenerate: true
hidden:
  only:
    skipGenerate: true
"#;

    fn files() -> FileSet {
        let mut ctx = ScanContext::default();
        ctx.add_schema(serde_yaml::from_str::<SchemaFile>(SCHEMA).unwrap());
        let model = ResolvedModel::build(&ctx).unwrap();
        NativeBackend::new("rpc").emit(&model).unwrap()
    }

    #[test]
    fn test_file_layout() {
        let files = files();
        assert_eq!(
            files.paths().collect::<Vec<_>>(),
            vec![
                "native/rpc_types.h",
                "native/rpc_types.c",
                "native/eth_api.h",
                "native/eth_api.c",
                "native/net.h",
                "native/net.c",
                "native/rpc_dispatch.h",
            ]
        );
    }

    #[test]
    fn test_headers_are_guarded() {
        let files = files();
        let header = files.get("native/eth_api.h").unwrap();
        assert!(header.starts_with("/* Generated by rpcgen. Do not edit. */\n"));
        assert!(header.contains("#ifndef RPC_ETH_API_H\n#define RPC_ETH_API_H\n"));
        assert!(header.contains("#include \"rpc_types.h\"\n"));
        assert!(files.get("native/rpc_types.h").unwrap().contains("typedef struct Tx_s Tx_t;"));
    }

    #[test]
    fn test_alias_source_includes_target_module() {
        let files = files();
        let net = files.get("native/net.c").unwrap();
        assert!(net.contains("#include \"eth_api.h\"\n"));
        assert!(net.contains("return rpc_handle_eth_getBalance(ctx, args);"));
    }

    #[test]
    fn test_dispatch_header_chains_modules() {
        let files = files();
        let dispatch = files.get("native/rpc_dispatch.h").unwrap();
        assert!(dispatch.contains("#include \"eth_api.h\"\n#include \"net.h\"\n"));
        assert!(!dispatch.contains("hidden"));
        assert!(dispatch.contains("  rpc_eth_api_methods,\n  rpc_net_methods,\n  NULL,\n"));
        assert!(dispatch.contains("static inline rpc_status_t rpc_dispatch(rpc_ctx_t* ctx, const char* method, json_t args) {"));
        assert!(dispatch.contains("  status = rpc_eth_api_dispatch(ctx, method, args);\n  if (status != RPC_NOT_FOUND) {\n    return status;\n  }\n"));
    }
}
