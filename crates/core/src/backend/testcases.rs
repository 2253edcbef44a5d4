//! Test-case backend: `tests/<method>.json` for the external test runner.

use serde_json::json;
use tracing::debug;

use super::{Backend, FileSet, pretty_json};
use crate::error::Result;
use crate::resolved::ResolvedModel;

/// Emits one JSON file per method that has test cases.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestCaseBackend;

fn file_stem(method: &str) -> String {
    method
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Backend for TestCaseBackend {
    fn name(&self) -> &'static str {
        "testcases"
    }

    fn emit(&self, model: &ResolvedModel) -> Result<FileSet> {
        let mut files = FileSet::new();
        for (name, cases) in &model.test_cases {
            // unknown methods were already reported as warnings
            let Some(method) = model.method(name) else {
                continue;
            };
            let params: Vec<&str> = method.params.iter().map(|p| p.name.as_str()).collect();
            let doc = json!({
                "method": name,
                "params": params,
                "cases": cases,
            });
            debug!(method = %name, cases = cases.len(), "test cases");
            files.insert(format!("tests/{}.json", file_stem(name)), pretty_json(&doc));
        }
        Ok(files)
    }
}
