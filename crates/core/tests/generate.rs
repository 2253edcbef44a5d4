#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use rpcgen_core::{BackendKind, GenError, GeneratorConfig, generate, validate};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ACCOUNT: &str = "0xabcabcabcabcabcabcabcabcabcabcabcabcabca";
const BALANCE: &str = "0x0de0b6b3a7640000";

const WALLET_SCHEMA: &str = r#"
config:
  endpoint:
    type: string
    descr: Node URL.
    default: http://localhost:8545
wallet:
  _descr: Wallet calls.
  get_balance:
    descr: Balance of an account in wei.
    params:
      account: address
    result: uint256
  balance_of:
    descr: Same as get_balance.
    alias: get_balance
"#;

fn write(dir: &Path, rel: &str, text: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn wallet_project(dir: &Path) {
    write(dir, "schemas/wallet.yml", WALLET_SCHEMA);
    write(
        dir,
        "schemas/wallet.test.yml",
        &format!(
            "get_balance:\n  - descr: one ether\n    input: [\"{ACCOUNT}\"]\n    expected_output: \"{BALANCE}\"\n"
        ),
    );
}

fn config(dir: &Path) -> GeneratorConfig {
    GeneratorConfig {
        sources: vec![dir.join("schemas")],
        output: dir.join("out"),
        ..GeneratorConfig::default()
    }
}

fn read(dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(dir.join("out").join(rel)).unwrap()
}

fn snapshot(out: &Path) -> Vec<(PathBuf, String)> {
    let mut files: Vec<(PathBuf, String)> = walkdir::WalkDir::new(out)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| (e.path().to_path_buf(), std::fs::read_to_string(e.path()).unwrap()))
        .collect();
    files.sort();
    files
}

#[tokio::test]
async fn test_example_pair_is_reproduced_in_docs_and_test_json() {
    let dir = tempfile::tempdir().unwrap();
    wallet_project(dir.path());
    let report = generate(&config(dir.path()), false).await.unwrap();
    assert!(report.write.stale.is_empty());
    assert!(report.warnings.is_empty());

    let page = read(dir.path(), "docs/wallet.md");
    let request = serde_json::to_string_pretty(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "get_balance",
        "params": [ACCOUNT],
    }))
    .unwrap();
    let response = serde_json::to_string_pretty(&json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": BALANCE,
    }))
    .unwrap();
    assert!(page.contains(&request));
    assert!(page.contains(&response));

    let cases: Value = serde_json::from_str(&read(dir.path(), "tests/get_balance.json")).unwrap();
    assert_eq!(cases["method"], "get_balance");
    assert_eq!(cases["params"], json!(["account"]));
    assert_eq!(cases["cases"][0]["input"], json!([ACCOUNT]));
    assert_eq!(cases["cases"][0]["expected_output"], json!(BALANCE));
}

#[tokio::test]
async fn test_second_run_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    wallet_project(dir.path());
    let config = config(dir.path());

    let first = generate(&config, false).await.unwrap();
    assert_eq!(first.write.written.len(), first.files);
    let before = snapshot(&config.output);

    let second = generate(&config, false).await.unwrap();
    assert!(second.write.written.is_empty());
    assert_eq!(second.write.unchanged, second.files);
    assert_eq!(snapshot(&config.output), before);
}

#[tokio::test]
async fn test_check_mode_reports_stale_files_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    wallet_project(dir.path());
    let config = config(dir.path());

    let report = generate(&config, true).await.unwrap();
    assert_eq!(report.write.stale.len(), report.files);
    assert!(!config.output.exists());

    generate(&config, false).await.unwrap();
    let edited = config.output.join("docs/wallet.md");
    std::fs::write(&edited, "hand edit\n").unwrap();

    let report = generate(&config, true).await.unwrap();
    assert_eq!(report.write.stale.len(), 1);
    assert_eq!(report.write.stale[0].path, edited);
    assert!(report.write.stale[0].diff.contains("-hand edit\n"));
    assert!(matches!(
        report.write.ensure_fresh(),
        Err(GenError::Stale { count: 1 })
    ));
    assert_eq!(std::fs::read_to_string(&edited).unwrap(), "hand edit\n");
}

#[tokio::test]
async fn test_alias_follows_target_signature_in_every_backend() {
    let dir = tempfile::tempdir().unwrap();
    wallet_project(dir.path());
    let config = config(dir.path());
    generate(&config, false).await.unwrap();

    let swift = read(dir.path(), "swift/WalletApi.swift");
    assert!(swift.contains("public func balanceOf(account: String) async throws -> String {"));
    assert!(swift.contains("return try await getBalance(account: account)"));
    let native = read(dir.path(), "native/wallet.c");
    assert!(native.contains("return rpc_handle_get_balance(ctx, args);"));
    let docs = read(dir.path(), "docs/wallet.md");
    assert!(docs.contains("Alias of [`get_balance`](#get_balance)."));

    write(
        dir.path(),
        "schemas/wallet.yml",
        &WALLET_SCHEMA.replace(
            "      account: address\n",
            "      account: address\n      block:\n        type: uint64\n        optional: true\n",
        ),
    );
    generate(&config, false).await.unwrap();
    let swift = read(dir.path(), "swift/WalletApi.swift");
    assert!(swift.contains(
        "public func balanceOf(account: String, block: UInt64? = nil) async throws -> String {"
    ));
    assert!(swift.contains("return try await getBalance(account: account, block: block)"));
}

#[tokio::test]
async fn test_missing_tests_are_warnings_not_errors() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "schemas/wallet.yml", WALLET_SCHEMA);
    let report = generate(&config(dir.path()), false).await.unwrap();
    assert_eq!(report.warnings, vec!["method 'get_balance' has no test cases".to_string()]);
}

#[tokio::test]
async fn test_backend_selection() {
    let dir = tempfile::tempdir().unwrap();
    wallet_project(dir.path());
    let config = GeneratorConfig {
        backends: vec![BackendKind::Testcases],
        ..config(dir.path())
    };
    let report = generate(&config, false).await.unwrap();
    assert_eq!(report.files, 1);
    assert!(config.output.join("tests/get_balance.json").exists());
    assert!(!config.output.join("docs").exists());
}

#[tokio::test]
async fn test_validate_reports_every_structural_error() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "schemas/api.yml",
        "types:\n  A:\n    _extends: B\n  B:\n    _extends: A\ng:\n  uses_a:\n    params:\n      a: A\n  bad:\n    params:\n      x: nonsense\n  fwd:\n    alias: nowhere\n",
    );
    write(dir.path(), "schemas/api.test.yml", "bad:\n  - input: [1]\n");
    let report = validate(&config(dir.path())).await.unwrap();
    let messages: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
    assert_eq!(messages.len(), 4, "{messages:?}");
    assert!(messages[0].contains("neither expected_output nor expected_failure"));
    assert!(messages.iter().any(|m| m.starts_with("_extends cycle: ")));
    assert!(messages.iter().any(|m| m == "unknown type 'nonsense' at g.bad.x"));
    assert!(messages.iter().any(|m| m == "method 'fwd' aliases unknown method 'nowhere'"));
}

#[tokio::test]
async fn test_openapi_document_fetched_over_http() {
    let server = MockServer::start().await;
    let doc = json!({
        "openapi": "3.0.0",
        "paths": {
            "/users": {
                "get": {
                    "summary": "List users.",
                    "responses": {"200": {"content": {"application/json": {"schema": {
                        "type": "array",
                        "items": {"$ref": "#/components/schemas/User"}
                    }}}}}
                }
            }
        },
        "components": {"schemas": {"User": {
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
        }}}
    });
    Mock::given(method("GET"))
        .and(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(doc.to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "schemas/users.yml",
        &format!(
            "users:\n  generate_rpc:\n    openapi:\n      source: {}/openapi.json\n",
            server.uri()
        ),
    );
    let config = GeneratorConfig {
        backends: vec![BackendKind::Docs],
        ..config(dir.path())
    };
    let report = generate(&config, false).await.unwrap();
    assert_eq!(report.warnings, vec!["method 'get_users' has no test cases".to_string()]);
    let page = read(dir.path(), "docs/users.md");
    assert!(page.contains("### get_users"));
    assert!(page.contains("### User"));
}

#[tokio::test]
async fn test_openapi_fetch_failure_names_the_directive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "schemas/users.yml",
        &format!(
            "users:\n  generate_rpc:\n    openapi:\n      source: {}/missing.json\n",
            server.uri()
        ),
    );
    let err = generate(&config(dir.path()), false).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("users.yml: users: failed to fetch"), "{message}");
}
