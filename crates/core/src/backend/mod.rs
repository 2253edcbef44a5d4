//! Output backends.
//!
//! A backend turns the frozen [`ResolvedModel`] into a [`FileSet`]. Backends
//! never touch the filesystem or the model; the driver decides what gets
//! written.

pub mod cli;
pub mod docs;
pub mod native;
pub mod swift;
pub mod testcases;

use indexmap::IndexMap;
use serde::Serialize;
use tera::{Context, Tera};

use crate::config::{BackendKind, GeneratorConfig};
use crate::error::{GenError, Result};
use crate::resolved::ResolvedModel;

/// Banner placed at the top of every generated file.
pub const GENERATED_BANNER: &str = "Generated by rpcgen. Do not edit.";

/// Generated files, keyed by `/`-separated path relative to the output root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: IndexMap<String, String>,
}

impl FileSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Content of a file.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Paths in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// `(path, content)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }

    /// Move every file of `other` into this set.
    pub fn extend(&mut self, other: FileSet) {
        self.files.extend(other.files);
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// One output format.
pub trait Backend {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Render every file of this backend.
    fn emit(&self, model: &ResolvedModel) -> Result<FileSet>;
}

/// The enabled backends, in emission order.
pub fn backends(config: &GeneratorConfig) -> Vec<Box<dyn Backend>> {
    BackendKind::ALL
        .into_iter()
        .filter(|kind| config.enabled(*kind))
        .map(|kind| -> Box<dyn Backend> {
            match kind {
                BackendKind::Native => Box::new(native::NativeBackend::new(&config.native.prefix)),
                BackendKind::Swift => Box::new(swift::SwiftBackend::new(&config.swift.module)),
                BackendKind::Docs => Box::new(docs::DocsBackend::new(&config.docs.title)),
                BackendKind::Testcases => Box::new(testcases::TestCaseBackend),
                BackendKind::Cli => Box::new(cli::CliBackend::new(&config.cli.program)),
            }
        })
        .collect()
}

/// Render an embedded tera template.
pub(crate) fn render_template(name: &str, template: &str, data: &impl Serialize) -> Result<String> {
    let template_err = |source| GenError::Template {
        name: name.to_string(),
        source,
    };
    let context = Context::from_serialize(data).map_err(template_err)?;
    Tera::one_off(template, &context, false).map_err(template_err)
}

/// Pretty JSON with a trailing newline.
pub(crate) fn pretty_json(value: &impl Serialize) -> String {
    let mut out = serde_json::to_string_pretty(value).unwrap_or_default();
    out.push('\n');
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_set_order_and_replace() {
        let mut files = FileSet::new();
        files.insert("b.txt", "1");
        files.insert("a.txt", "2");
        files.insert("b.txt", "3");
        assert_eq!(files.paths().collect::<Vec<_>>(), vec!["b.txt", "a.txt"]);
        assert_eq!(files.get("b.txt"), Some("3"));
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_backend_selection_follows_config() {
        let mut config = GeneratorConfig::default();
        config.backends = vec![BackendKind::Cli, BackendKind::Native];
        let names: Vec<&str> = backends(&config).iter().map(|b| b.name()).collect();
        assert_eq!(names, vec!["native", "cli"]);
    }

    #[test]
    fn test_render_template_error_names_template() {
        let out = render_template("t", "hi {{ who }}", &json!({"who": "there"})).unwrap();
        assert_eq!(out, "hi there");
        let err = render_template("broken", "{% if %}", &json!({})).unwrap_err();
        assert!(err.to_string().starts_with("template 'broken'"));
    }
}
