//! Solidity ABI importer.
//!
//! Consumes solc standard-JSON output (from an artifact file, or by running
//! `solc --standard-json` on a source file) and synthesizes one method per
//! ABI function. Read-only functions map inputs and outputs directly;
//! state-mutating functions gain an execution-level and a wallet param and
//! return [`TX_DATA_TYPE`].

use std::path::Path;
use std::process::Stdio;

use indexmap::IndexMap;
use rpcgen_common::{to_pascal_case, to_snake_case};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::ImportError;
use crate::model::{
    FieldDef, FieldShape, RpcFunctionDef, SolidityBinding, SoliditySource, TypeBody,
};
use crate::registry::TypeRegistry;

/// Result type of every state-mutating function.
pub const TX_DATA_TYPE: &str = "TxData";

/// Implicit param selecting how far a transaction proceeds.
pub const EXECUTION_PARAM: &str = "execution";

/// Implicit param overriding the signing wallet.
pub const WALLET_PARAM: &str = "wallet";

/// Execution levels, in pipeline order.
pub const EXECUTION_LEVELS: &[&str] = &["prepare", "sign", "send", "receipt"];

/// Level used when the caller passes none.
pub const DEFAULT_EXECUTION: &str = "send";

// ============================================================================
// Compiler output
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct SolcOutput {
    #[serde(default)]
    errors: Vec<SolcMessage>,
    #[serde(default)]
    contracts: IndexMap<String, IndexMap<String, ContractOutput>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolcMessage {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    formatted_message: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ContractOutput {
    #[serde(default)]
    abi: Vec<AbiEntry>,
    #[serde(default)]
    devdoc: DevDoc,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbiEntry {
    #[serde(rename = "type", default = "default_entry_type")]
    entry_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
    #[serde(default)]
    outputs: Vec<AbiParam>,
    #[serde(default)]
    state_mutability: Option<String>,
    /// Pre-0.5 ABIs.
    #[serde(default)]
    constant: Option<bool>,
}

fn default_entry_type() -> String {
    "function".to_string()
}

impl AbiEntry {
    fn is_read_only(&self) -> bool {
        match self.state_mutability.as_deref() {
            Some(m) => matches!(m, "view" | "pure"),
            None => self.constant.unwrap_or(false),
        }
    }

    fn signature(&self) -> String {
        let types: Vec<String> = self.inputs.iter().map(AbiParam::canonical_type).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AbiParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    components: Vec<AbiParam>,
    #[serde(default)]
    internal_type: Option<String>,
}

impl AbiParam {
    /// Type as it appears in the function signature; tuples expand to `(a,b)`.
    fn canonical_type(&self) -> String {
        match self.ty.strip_prefix("tuple") {
            Some(suffix) => {
                let inner: Vec<String> = self.components.iter().map(Self::canonical_type).collect();
                format!("({}){suffix}", inner.join(","))
            }
            None => self.ty.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DevDoc {
    #[serde(default)]
    methods: IndexMap<String, MethodDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct MethodDoc {
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    params: IndexMap<String, String>,
    #[serde(default)]
    returns: IndexMap<String, String>,
}

// ============================================================================
// Loading
// ============================================================================

/// Load the compiler output named by `source` and import the contract.
pub async fn import(
    source: &SoliditySource,
    schema_dir: &Path,
    registry: &mut TypeRegistry,
) -> Result<IndexMap<String, RpcFunctionDef>, ImportError> {
    let output = match (&source.artifact, &source.source) {
        (Some(artifact), _) => {
            let path = schema_dir.join(artifact);
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ImportError::Read {
                    path: path.clone(),
                    source,
                })?;
            serde_json::from_str(&text).map_err(|e| ImportError::Parse {
                location: path.display().to_string(),
                message: e.to_string(),
            })?
        }
        (None, Some(sol)) => compile(&schema_dir.join(sol)).await?,
        (None, None) => {
            return Err(ImportError::Compiler(
                "solidity directive needs an 'artifact' or a 'source'".to_string(),
            ));
        }
    };
    let methods = import_output(&output, &source.contract, &source.prefix, registry)?;
    info!(contract = %source.contract, methods = methods.len(), "imported contract ABI");
    Ok(methods)
}

/// Run `solc --standard-json` on one source file.
async fn compile(path: &Path) -> Result<Value, ImportError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "contract.sol".to_string());
    let input = json!({
        "language": "Solidity",
        "sources": { file_name: { "content": content } },
        "settings": { "outputSelection": { "*": { "*": ["abi", "devdoc"] } } },
    });

    debug!(path = %path.display(), "running solc");
    let mut child = tokio::process::Command::new("solc")
        .arg("--standard-json")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ImportError::Compiler(e.to_string()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.to_string().as_bytes())
            .await
            .map_err(|e| ImportError::Compiler(e.to_string()))?;
    }
    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ImportError::Compiler(e.to_string()))?;
    if !output.status.success() {
        return Err(ImportError::Compiler(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    serde_json::from_slice(&output.stdout).map_err(|e| ImportError::Parse {
        location: "solc output".to_string(),
        message: e.to_string(),
    })
}

// ============================================================================
// Import
// ============================================================================

/// Synthesize methods for `contract` from parsed compiler output.
pub fn import_output(
    output: &Value,
    contract: &str,
    prefix: &str,
    registry: &mut TypeRegistry,
) -> Result<IndexMap<String, RpcFunctionDef>, ImportError> {
    let output: SolcOutput =
        serde_json::from_value(output.clone()).map_err(|e| ImportError::Parse {
            location: "solc output".to_string(),
            message: e.to_string(),
        })?;

    let messages: Vec<String> = output
        .errors
        .iter()
        .filter(|m| m.severity == "error")
        .map(|m| {
            if m.formatted_message.is_empty() {
                m.message.clone()
            } else {
                m.formatted_message.trim_end().to_string()
            }
        })
        .collect();
    if !messages.is_empty() {
        return Err(ImportError::Solidity { messages });
    }

    let compiled = output
        .contracts
        .values()
        .find_map(|contracts| contracts.get(contract))
        .ok_or_else(|| ImportError::MissingContract(contract.to_string()))?;

    let mut methods = IndexMap::new();
    for entry in compiled.abi.iter().filter(|e| e.entry_type == "function") {
        let signature = entry.signature();
        let base = format!("{prefix}{}", to_snake_case(&entry.name));
        let name = if methods.contains_key(&base) {
            // overloads are told apart by arity
            let by_arity = format!("{base}_{}", entry.inputs.len());
            if methods.contains_key(&by_arity) {
                return Err(ImportError::DuplicateFunction {
                    name: base,
                    method: contract.to_string(),
                    path: signature,
                });
            }
            by_arity
        } else {
            base
        };
        let doc = compiled.devdoc.methods.get(&signature);
        let def = function(registry, contract, &name, &signature, entry, doc)?;
        debug!(method = %name, signature = %signature, "synthesized contract method");
        methods.insert(name, def);
    }
    Ok(methods)
}

fn function(
    registry: &mut TypeRegistry,
    contract: &str,
    name: &str,
    signature: &str,
    entry: &AbiEntry,
    doc: Option<&MethodDoc>,
) -> Result<RpcFunctionDef, ImportError> {
    let hint = to_pascal_case(name);
    let mut params = IndexMap::new();
    for (input, param_name) in entry.inputs.iter().zip(positional_names(&entry.inputs)) {
        let mut def = abi_field(registry, input, &format!("{hint}{}", to_pascal_case(&param_name)))?;
        if let Some(descr) = doc.and_then(|d| d.params.get(&input.name)) {
            def.descr = descr.trim().to_string();
        }
        params.insert(param_name, FieldShape::from(def));
    }

    let mutating = !entry.is_read_only();
    let result = if mutating {
        for implicit in [EXECUTION_PARAM, WALLET_PARAM] {
            if params.contains_key(implicit) {
                return Err(ImportError::Parse {
                    location: signature.to_string(),
                    message: format!("input '{implicit}' clashes with the implicit transaction param"),
                });
            }
        }
        params.insert(EXECUTION_PARAM.to_string(), FieldShape::from(execution_param()));
        params.insert(
            WALLET_PARAM.to_string(),
            FieldShape::from(
                FieldDef::named("address")
                    .optional()
                    .with_descr("Wallet that signs the transaction instead of the configured one."),
            ),
        );
        ensure_tx_data(registry)?;
        Some(FieldDef::named(TX_DATA_TYPE).with_descr("The transaction, as far as it was processed."))
    } else {
        outputs_field(registry, &entry.outputs, &format!("{hint}Result"), doc)?
    };

    Ok(RpcFunctionDef {
        descr: doc
            .and_then(|d| d.details.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string(),
        params,
        result: result.map(FieldShape::from),
        solidity: Some(SolidityBinding {
            contract: contract.to_string(),
            signature: signature.to_string(),
            mutating,
        }),
        ..RpcFunctionDef::default()
    })
}

fn positional_name(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("p{index}")
    } else {
        name.trim_start_matches('_').to_string()
    }
}

/// Names for a param list; a name already taken (`to` and `_to`) falls back to `p<N>`.
fn positional_names(params: &[AbiParam]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let mut name = positional_name(&param.name, i);
        if name.is_empty() || names.contains(&name) {
            name = format!("p{i}");
        }
        while names.contains(&name) {
            name.push('_');
        }
        names.push(name);
    }
    names
}

/// The execution-level enum param of state-mutating functions.
pub fn execution_param() -> FieldDef {
    let mut def = FieldDef::named("string")
        .optional()
        .with_descr("How far the transaction proceeds: prepare, sign, send or receipt.");
    def.enum_values = Some(EXECUTION_LEVELS.iter().map(ToString::to_string).collect());
    def.default = Some(Value::String(DEFAULT_EXECUTION.to_string()));
    def
}

/// Register the fixed transaction-data type once.
///
/// A same-named type from the schema files is accepted only when it has
/// exactly this body.
fn ensure_tx_data(registry: &mut TypeRegistry) -> Result<(), ImportError> {
    let fields: IndexMap<String, FieldShape> = [
        ("to", FieldDef::named("address").with_descr("Contract address.")),
        ("data", FieldDef::named("bytes").with_descr("ABI-encoded call data.")),
        ("value", FieldDef::named("uint256").with_descr("Wei sent along.")),
        ("gas", FieldDef::named("uint64").optional().with_descr("Gas limit.")),
        ("nonce", FieldDef::named("uint64").optional().with_descr("Sender nonce.")),
        ("signedTx", FieldDef::named("bytes").optional().with_descr("Raw signed transaction (sign and later).")),
        ("hash", FieldDef::named("bytes32").optional().with_descr("Transaction hash (send and later).")),
        ("blockNumber", FieldDef::named("uint64").optional().with_descr("Inclusion block (receipt).")),
        ("status", FieldDef::named("bool").optional().with_descr("Execution success (receipt).")),
    ]
    .into_iter()
    .map(|(k, def)| (k.to_string(), FieldShape::from(def)))
    .collect();
    let body = TypeBody { extends: None, fields };
    match registry.get(TX_DATA_TYPE) {
        Some(existing) if *existing == body => Ok(()),
        Some(_) => Err(ImportError::ReservedType(TX_DATA_TYPE.to_string())),
        None => {
            registry.insert(TX_DATA_TYPE, body);
            Ok(())
        }
    }
}

fn outputs_field(
    registry: &mut TypeRegistry,
    outputs: &[AbiParam],
    hint: &str,
    doc: Option<&MethodDoc>,
) -> Result<Option<FieldDef>, ImportError> {
    let return_doc = |name: &str, index: usize| {
        doc.and_then(|d| {
            d.returns
                .get(name)
                .or_else(|| d.returns.get(&format!("_{index}")))
        })
        .map(|s| s.trim().to_string())
    };
    match outputs {
        [] => Ok(None),
        [single] => {
            let mut def = abi_field(registry, single, hint)?;
            if let Some(descr) = return_doc(&single.name, 0) {
                def.descr = descr;
            }
            Ok(Some(def))
        }
        many => {
            let mut fields = IndexMap::new();
            for (i, (output, field_name)) in many.iter().zip(positional_names(many)).enumerate() {
                let mut def = abi_field(registry, output, &format!("{hint}{}", to_pascal_case(&field_name)))?;
                if let Some(descr) = return_doc(&output.name, i) {
                    def.descr = descr;
                }
                fields.insert(field_name, FieldShape::from(def));
            }
            let name = register_object(registry, hint, fields)?;
            Ok(Some(FieldDef::named(&name)))
        }
    }
}

/// Field for one ABI param; `T[]`/`T[N]` set `array`, tuples become types.
fn abi_field(registry: &mut TypeRegistry, param: &AbiParam, hint: &str) -> Result<FieldDef, ImportError> {
    let (element, fixed_len) = match param.ty.rfind('[') {
        Some(open) if param.ty.ends_with(']') => {
            let len = param.ty[open + 1..param.ty.len() - 1].parse::<u64>().ok();
            (&param.ty[..open], Some(len))
        }
        _ => (param.ty.as_str(), None),
    };
    if element.ends_with(']') {
        // nested arrays have no native representation
        let mut def = FieldDef::named("any");
        def.array = true;
        return Ok(def);
    }

    let mut def = if element == "tuple" {
        let struct_hint = param
            .internal_type
            .as_deref()
            .and_then(|t| t.strip_prefix("struct "))
            .map(|t| t.rsplit('.').next().unwrap_or(t).trim_end_matches("[]").to_string())
            .unwrap_or_else(|| hint.to_string());
        let mut fields = IndexMap::new();
        for (component, field_name) in param.components.iter().zip(positional_names(&param.components)) {
            let def = abi_field(
                registry,
                component,
                &format!("{struct_hint}{}", to_pascal_case(&field_name)),
            )?;
            fields.insert(field_name, FieldShape::from(def));
        }
        FieldDef::named(&register_object(registry, &struct_hint, fields)?)
    } else {
        FieldDef::named(abi_primitive(element))
    };

    if let Some(len) = fixed_len {
        def.array = true;
        def.min_length = len;
        def.max_length = len;
    }
    Ok(def)
}

fn abi_primitive(ty: &str) -> &str {
    match ty {
        "uint" => "uint256",
        "int" => "int256",
        "function" => "bytes24",
        t if t.starts_with("fixed") || t.starts_with("ufixed") => "string",
        t => t,
    }
}

/// Register an object type, reusing a structurally identical one.
fn register_object(
    registry: &mut TypeRegistry,
    hint: &str,
    fields: IndexMap<String, FieldShape>,
) -> Result<String, ImportError> {
    let body = TypeBody { extends: None, fields };
    if let Some(existing) = registry.find_by_shape(&body.shape_key()) {
        return Ok(existing.to_string());
    }
    let base = to_pascal_case(hint);
    let name = if registry.contains(&base) {
        (1..=999)
            .map(|i| format!("{base}{i}"))
            .find(|n| !registry.contains(n))
            .ok_or(ImportError::SuffixExhausted(base))?
    } else {
        base
    };
    registry.insert(name.clone(), body);
    Ok(name)
}
