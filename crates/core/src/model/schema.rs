//! Schema-file and test-file documents.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::field::{FieldShape, TypeBody};

/// One `*.yml` schema file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaFile {
    /// Named types.
    #[serde(default)]
    pub types: IndexMap<String, TypeBody>,
    /// Configuration options documented on the config page and in CLI help.
    #[serde(default)]
    pub config: IndexMap<String, ConfigOption>,
    /// Every other top-level key is an API group.
    #[serde(flatten)]
    pub groups: IndexMap<String, ApiGroup>,
}

/// A named group of RPC methods; one native module, one Swift class, one doc page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiGroup {
    /// Group documentation.
    #[serde(rename = "_descr", default)]
    pub descr: String,
    /// Output file stem; defaults to the group name.
    #[serde(rename = "_module", default)]
    pub module: Option<String>,
    /// Importer directive.
    #[serde(default)]
    pub generate_rpc: Option<GenerateRpc>,
    /// Methods by name, in declaration order.
    #[serde(flatten)]
    pub methods: IndexMap<String, RpcFunctionDef>,
}

impl ApiGroup {
    /// Shallow-merge a later definition of the same group over this one.
    pub fn merge(&mut self, later: ApiGroup) {
        if !later.descr.is_empty() {
            self.descr = later.descr;
        }
        if later.module.is_some() {
            self.module = later.module;
        }
        if later.generate_rpc.is_some() {
            self.generate_rpc = later.generate_rpc;
        }
        for (name, def) in later.methods {
            self.methods.insert(name, def);
        }
    }
}

/// Importer directive of a group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRpc {
    /// Import methods from an OpenAPI document.
    #[serde(default)]
    pub openapi: Option<OpenApiSource>,
    /// Import methods from a compiled Solidity contract.
    #[serde(default)]
    pub solidity: Option<SoliditySource>,
}

/// Where to load an OpenAPI document from.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenApiSource {
    /// Path (relative to the schema file) or `http(s)` URL.
    pub source: String,
    /// Prepended to every synthesized method name.
    #[serde(default)]
    pub prefix: String,
}

/// Where to load a contract ABI from.
#[derive(Debug, Clone, Deserialize)]
pub struct SoliditySource {
    /// solc standard-JSON output.
    #[serde(default)]
    pub artifact: Option<PathBuf>,
    /// `.sol` source compiled with `solc --standard-json`.
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// Contract name within the output.
    pub contract: String,
    /// Prepended to every synthesized method name.
    #[serde(default)]
    pub prefix: String,
}

/// One callable method as declared (or imported).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcFunctionDef {
    /// Documentation.
    #[serde(default)]
    pub descr: String,
    /// Positional parameters.
    #[serde(default)]
    pub params: IndexMap<String, FieldShape>,
    /// Result; `None` means the method returns nothing.
    #[serde(default)]
    pub result: Option<FieldShape>,
    /// Explicit documentation example.
    #[serde(default)]
    pub example: Option<Example>,
    /// Extra native validation code run after parameter checks.
    #[serde(default)]
    pub validation: Option<String>,
    /// Related methods, rendered as cross-links.
    #[serde(default)]
    pub depends: Vec<String>,
    /// Build options guarding the native dispatch entry.
    #[serde(default)]
    pub cmake_options: Vec<String>,
    /// Forward to another method instead of defining one.
    #[serde(default)]
    pub alias: Option<String>,
    /// Skip Swift and docs.
    #[serde(default)]
    pub skip_api: bool,
    /// Skip the native handler.
    #[serde(default)]
    pub skip_generate: bool,
    /// Set by the OpenAPI importer.
    #[serde(skip)]
    pub http: Option<HttpBinding>,
    /// Set by the Solidity importer.
    #[serde(skip)]
    pub solidity: Option<SolidityBinding>,
}

/// Request/response pair shown in docs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Example {
    /// Positional request params.
    #[serde(default)]
    pub request: Vec<Value>,
    /// Expected response.
    #[serde(default)]
    pub response: Value,
}

/// How an imported method maps onto an HTTP endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBinding {
    /// Upper-case HTTP method.
    pub method: String,
    /// Path template, `/users/{id}`.
    pub path: String,
    /// Params substituted into the path.
    pub path_params: Vec<String>,
    /// Params serialized into the query string.
    pub query_params: Vec<String>,
    /// Param sent as the JSON body.
    pub body_param: Option<String>,
}

/// How an imported method maps onto a contract function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolidityBinding {
    /// Contract name.
    pub contract: String,
    /// `name(type,type)`.
    pub signature: String,
    /// Sends a transaction rather than a call.
    pub mutating: bool,
}

/// A documented configuration option.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfigOption {
    /// Value type name.
    #[serde(rename = "type", default = "default_option_type")]
    pub ty: String,
    /// Documentation.
    #[serde(default)]
    pub descr: String,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Environment variable that sets the option.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    /// Allowed values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// Short command-line flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

fn default_option_type() -> String {
    "string".to_string()
}

/// One test case of a method.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TestCase {
    /// What the case checks.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub descr: String,
    /// Positional request params.
    #[serde(default)]
    pub input: Vec<Value>,
    /// Expected result; present-but-null counts as present.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<Value>,
    /// Expected error.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub expected_failure: Option<Value>,
    /// Upstream responses the runner should replay.
    #[serde(rename = "mockedResponses", default, skip_serializing_if = "Vec::is_empty")]
    pub mocked_responses: Vec<Value>,
    /// Client config for the case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A `*.test.yml` file: method name to ordered cases.
pub type TestFile = IndexMap<String, Vec<TestCase>>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
types:
  Tx:
    to: address
    value: uint256
config:
  chain_id:
    type: uint64
    descr: chain to talk to
    default: 1
eth:
  _descr: ethereum methods
  _module: eth_api
  eth_getBalance:
    descr: balance of an account
    params:
      account: address
      block:
        type: uint64
        optional: true
    result: uint256
    depends: [eth_blockNumber]
    cmakeOptions: [ETH_FULL]
  eth_balance:
    alias: eth_getBalance
    skipApi: true
"#;

    #[test]
    fn test_schema_file_layout() {
        let file: SchemaFile = serde_yaml::from_str(SCHEMA).unwrap();
        assert_eq!(file.types.len(), 1);
        assert_eq!(file.config["chain_id"].ty, "uint64");
        let eth = &file.groups["eth"];
        assert_eq!(eth.descr, "ethereum methods");
        assert_eq!(eth.module.as_deref(), Some("eth_api"));
        assert_eq!(eth.methods.keys().collect::<Vec<_>>(), vec!["eth_getBalance", "eth_balance"]);
        let get = &eth.methods["eth_getBalance"];
        assert_eq!(get.params.keys().collect::<Vec<_>>(), vec!["account", "block"]);
        assert_eq!(get.cmake_options, vec!["ETH_FULL"]);
        assert!(eth.methods["eth_balance"].skip_api);
    }

    #[test]
    fn test_group_merge_later_wins() {
        let mut first: ApiGroup =
            serde_yaml::from_str("_descr: old\na:\n  descr: one\nb:\n  descr: two").unwrap();
        let later: ApiGroup = serde_yaml::from_str("a:\n  descr: replaced").unwrap();
        first.merge(later);
        assert_eq!(first.descr, "old");
        assert_eq!(first.methods["a"].descr, "replaced");
        assert_eq!(first.methods["b"].descr, "two");
    }

    #[test]
    fn test_null_expected_output_is_present() {
        let file: TestFile =
            serde_yaml::from_str("m:\n  - input: [1]\n    expected_output: null\n  - input: []").unwrap();
        assert_eq!(file["m"][0].expected_output, Some(Value::Null));
        assert_eq!(file["m"][1].expected_output, None);
    }
}
