#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use rpcgen_cli::run_cli;

fn write(dir: &Path, rel: &str, text: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, text).unwrap();
}

fn project(dir: &Path) {
    write(
        dir,
        "rpcgen.yml",
        "sources: [schemas]\noutput: gen\nbackends: [docs, testcases]\n",
    );
    write(
        dir,
        "schemas/net.yml",
        "net:\n  net_version:\n    descr: Network id.\n    result: string\n",
    );
    write(
        dir,
        "schemas/net.test.yml",
        "net_version:\n  - input: []\n    expected_output: \"1\"\n",
    );
}

fn rpcgen(args: &[&str]) -> i32 {
    let mut argv = vec!["rpcgen".to_string()];
    argv.extend(args.iter().map(ToString::to_string));
    run_cli(argv)
}

#[test]
fn test_generate_then_check() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let config = dir.path().join("rpcgen.yml");
    let config = config.to_str().unwrap();

    assert_eq!(rpcgen(&["generate", "--config", config, "--check"]), 1);
    assert_eq!(rpcgen(&["generate", "--config", config]), 0);
    assert!(dir.path().join("gen/docs/net.md").exists());
    assert!(dir.path().join("gen/tests/net_version.json").exists());
    assert!(!dir.path().join("gen/swift").exists());
    assert_eq!(rpcgen(&["generate", "--config", config, "--check"]), 0);
}

#[test]
fn test_flags_override_project_file() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let out = dir.path().join("elsewhere");
    assert_eq!(
        rpcgen(&[
            "generate",
            "--config",
            dir.path().join("rpcgen.yml").to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--backend",
            "cli",
        ]),
        0
    );
    assert!(out.join("cli/options.json").exists());
    assert!(!out.join("docs").exists());
    assert!(!dir.path().join("gen").exists());
}

#[test]
fn test_validate_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    project(dir.path());
    let source = dir.path().join("schemas");
    let source = source.to_str().unwrap();
    let missing_config = dir.path().join("none.yml");
    let missing_config = missing_config.to_str().unwrap();

    assert_eq!(rpcgen(&["validate", "--source", source]), 0);

    write(dir.path(), "schemas/broken.yml", "net:\n  net_peers:\n    result: peerlist\n");
    assert_eq!(rpcgen(&["validate", "--source", source]), 1);
    assert_eq!(rpcgen(&["validate", "--config", missing_config]), 1);
}

#[test]
fn test_usage_errors() {
    assert_eq!(rpcgen(&["generate", "--backend", "java"]), 2);
    assert_eq!(rpcgen(&["frobnicate"]), 2);
}
