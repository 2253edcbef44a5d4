//! Generation driver.
//!
//! A run goes through four phases, strictly in this order:
//! 1. scan every source directory into a [`ScanContext`]
//! 2. run the importer directives found while scanning
//! 3. freeze the context into a [`ResolvedModel`]
//! 4. render every enabled backend and write the files that changed
//!
//! Every type must be registered before anything is resolved, so no
//! backend runs until the whole scan (imports included) is done.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use similar::TextDiff;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::backend::{FileSet, backends};
use crate::config::{CONFIG_FILE, GeneratorConfig};
use crate::error::{GenError, Result};
use crate::import::{openapi, solidity};
use crate::model::{ApiGroup, ConfigOption, GenerateRpc, SchemaFile, TestCase, TestFile};
use crate::registry::TypeRegistry;
use crate::resolved::ResolvedModel;

/// Soft warnings collected during a run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<String>,
}

impl Diagnostics {
    /// Log and record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    /// Warnings in the order they were raised.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug)]
struct PendingImport {
    file: PathBuf,
    group: String,
    directive: GenerateRpc,
}

/// Everything discovered by the scan.
///
/// Later files shallow-merge over earlier ones: same-named types, config
/// options and methods are replaced, groups are merged.
#[derive(Debug, Default)]
pub struct ScanContext {
    /// Named types from schema files and importers.
    pub registry: TypeRegistry,
    /// API groups in scan order.
    pub groups: IndexMap<String, ApiGroup>,
    /// Documented configuration options.
    pub config: IndexMap<String, ConfigOption>,
    /// Test cases by method name, in scan order.
    pub test_cases: IndexMap<String, Vec<TestCase>>,
    /// Soft warnings.
    pub diagnostics: Diagnostics,
    case_files: IndexMap<String, Vec<PathBuf>>,
    imports: Vec<PendingImport>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

fn is_yaml(name: &str) -> bool {
    name.ends_with(".yml") || name.ends_with(".yaml")
}

fn is_test_file(name: &str) -> bool {
    name.ends_with(".test.yml") || name.ends_with(".test.yaml")
}

fn is_config_file(name: &str) -> bool {
    name == CONFIG_FILE || name == "rpcgen.yaml"
}

impl ScanContext {
    /// Add a schema document that has no file of its own.
    pub fn add_schema(&mut self, file: SchemaFile) {
        self.add_schema_at(Path::new(""), file);
    }

    /// Add a schema document read from `path`.
    ///
    /// `generate_rpc` directives are queued for [`ScanContext::run_imports`];
    /// their relative sources resolve against the directory of `path`.
    pub fn add_schema_at(&mut self, path: &Path, file: SchemaFile) {
        for (name, body) in file.types {
            self.registry.insert(name, body);
        }
        self.config.extend(file.config);
        for (name, mut group) in file.groups {
            if let Some(directive) = group.generate_rpc.take() {
                self.imports.push(PendingImport {
                    file: path.to_path_buf(),
                    group: name.clone(),
                    directive,
                });
            }
            match self.groups.get_mut(&name) {
                Some(existing) => existing.merge(group),
                None => {
                    self.groups.insert(name, group);
                }
            }
        }
    }

    /// Append the cases of a test file read from `path`.
    pub fn add_test_file(&mut self, path: &Path, file: TestFile) {
        for (method, cases) in file {
            let origins = self.case_files.entry(method.clone()).or_default();
            origins.extend(std::iter::repeat_n(path.to_path_buf(), cases.len()));
            self.test_cases.entry(method).or_default().extend(cases);
        }
    }

    /// Walk `dir` (sorted by file name) and add every schema and test file.
    pub async fn scan_dir(&mut self, dir: &Path) -> Result<()> {
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));
        let mut scanned = 0usize;
        for entry in walker {
            let entry = entry.map_err(|err| {
                let path = err.path().map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
                GenError::io(path, err.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_yaml(&name) || is_config_file(&name) {
                continue;
            }
            let path = entry.path();
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|err| GenError::io(path, err))?;
            if text.trim().is_empty() {
                debug!(path = %path.display(), "empty file, skipping");
                continue;
            }
            let yaml_err = |source| GenError::Yaml {
                path: path.to_path_buf(),
                source,
            };
            if is_test_file(&name) {
                let file: TestFile = serde_yaml::from_str(&text).map_err(yaml_err)?;
                debug!(path = %path.display(), methods = file.len(), "test file");
                self.add_test_file(path, file);
            } else {
                let file: SchemaFile = serde_yaml::from_str(&text).map_err(yaml_err)?;
                debug!(path = %path.display(), groups = file.groups.len(), types = file.types.len(), "schema file");
                self.add_schema_at(path, file);
            }
            scanned += 1;
        }
        info!(dir = %dir.display(), files = scanned, "scanned sources");
        Ok(())
    }

    /// Run every queued `generate_rpc` directive, in scan order.
    ///
    /// Imported methods join their group; a method declared in a schema file
    /// keeps its declaration.
    pub async fn run_imports(&mut self) -> Result<()> {
        for import in std::mem::take(&mut self.imports) {
            let schema_dir = import.file.parent().unwrap_or_else(|| Path::new(""));
            let context = format!("{}: {}", import.file.display(), import.group);
            let wrap = |source| GenError::Import {
                context: context.clone(),
                source,
            };

            let mut methods = IndexMap::new();
            if let Some(source) = &import.directive.openapi {
                methods.extend(
                    openapi::import(source, schema_dir, &mut self.registry)
                        .await
                        .map_err(wrap)?,
                );
            }
            if let Some(source) = &import.directive.solidity {
                methods.extend(
                    solidity::import(source, schema_dir, &mut self.registry)
                        .await
                        .map_err(wrap)?,
                );
            }

            let group = self.groups.entry(import.group.clone()).or_default();
            let mut added = 0usize;
            for (name, def) in methods {
                if group.methods.contains_key(&name) {
                    debug!(group = %import.group, method = %name, "declared method wins over imported one");
                    continue;
                }
                group.methods.insert(name, def);
                added += 1;
            }
            info!(group = %import.group, methods = added, "imported methods");
        }
        Ok(())
    }

    fn case_errors(&self) -> Vec<GenError> {
        let mut errors = Vec::new();
        for (method, cases) in &self.test_cases {
            for (index, case) in cases.iter().enumerate() {
                if case.expected_output.is_none() && case.expected_failure.is_none() {
                    let file = self
                        .case_files
                        .get(method)
                        .and_then(|files| files.get(index))
                        .cloned()
                        .unwrap_or_default();
                    errors.push(GenError::MissingExpectation {
                        method: method.clone(),
                        index,
                        file,
                    });
                }
            }
        }
        errors
    }

    /// Every structural error, without stopping at the first one.
    pub fn validate(&self) -> Vec<GenError> {
        let mut errors = self.case_errors();
        ResolvedModel::build_collecting(self, &mut errors);
        errors
    }

    /// Resolve into the model handed to backends, reporting coverage warnings.
    pub fn freeze(&mut self) -> Result<ResolvedModel> {
        if let Some(err) = self.case_errors().into_iter().next() {
            return Err(err);
        }
        let model = ResolvedModel::build(self)?;
        for method in model.methods().filter(|m| m.alias.is_none()) {
            if !self.test_cases.contains_key(&method.name) {
                self.diagnostics
                    .warn(format!("method '{}' has no test cases", method.name));
            }
        }
        for name in self.test_cases.keys() {
            if model.method(name).is_none() {
                self.diagnostics
                    .warn(format!("test cases reference unknown method '{name}'"));
            }
        }
        Ok(model)
    }
}

/// Render every backend enabled in `config`.
pub fn render(model: &ResolvedModel, config: &GeneratorConfig) -> Result<FileSet> {
    let mut files = FileSet::new();
    for backend in backends(config) {
        let out = backend.emit(model)?;
        info!(backend = backend.name(), files = out.len(), "backend rendered");
        files.extend(out);
    }
    Ok(files)
}

/// A generated file whose on-disk content differs.
#[derive(Debug, Clone)]
pub struct StaleFile {
    /// Absolute (or output-relative) path.
    pub path: PathBuf,
    /// Unified diff from the current to the expected content.
    pub diff: String,
}

/// Outcome of writing a [`FileSet`].
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    /// Files created or rewritten.
    pub written: Vec<PathBuf>,
    /// Files already up to date.
    pub unchanged: usize,
    /// Files that would change (check mode only).
    pub stale: Vec<StaleFile>,
}

impl WriteReport {
    /// Fail when check mode found stale files.
    pub fn ensure_fresh(&self) -> Result<()> {
        if self.stale.is_empty() {
            Ok(())
        } else {
            Err(GenError::Stale {
                count: self.stale.len(),
            })
        }
    }
}

fn read_existing(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(GenError::io(path, err)),
    }
}

/// Write files under `out`, touching only those whose content changed.
///
/// With `check` set nothing is written; differing or missing files are
/// reported with a unified diff instead.
pub fn write_files(files: &FileSet, out: &Path, check: bool) -> Result<WriteReport> {
    let mut report = WriteReport::default();
    for (rel, content) in files.iter() {
        let path = out.join(rel);
        let existing = read_existing(&path)?;
        if existing.as_deref() == Some(content) {
            report.unchanged += 1;
            continue;
        }
        if check {
            let current = existing.unwrap_or_default();
            let diff = TextDiff::from_lines(current.as_str(), content)
                .unified_diff()
                .context_radius(3)
                .header(&format!("a/{rel}"), &format!("b/{rel}"))
                .to_string();
            report.stale.push(StaleFile { path, diff });
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| GenError::io(parent, err))?;
        }
        std::fs::write(&path, content).map_err(|err| GenError::io(&path, err))?;
        debug!(path = %path.display(), "wrote");
        report.written.push(path);
    }
    Ok(report)
}

/// Outcome of a generator run.
#[derive(Debug, Clone)]
pub struct GenerateReport {
    /// Number of rendered files.
    pub files: usize,
    /// What happened on disk.
    pub write: WriteReport,
    /// Soft warnings.
    pub warnings: Vec<String>,
}

/// Outcome of a validation run.
#[derive(Debug)]
pub struct ValidationReport {
    /// Structural errors.
    pub errors: Vec<GenError>,
    /// Soft warnings raised while scanning.
    pub warnings: Vec<String>,
}

async fn scan(config: &GeneratorConfig) -> Result<ScanContext> {
    let mut ctx = ScanContext::default();
    for source in &config.sources {
        ctx.scan_dir(source).await?;
    }
    ctx.run_imports().await?;
    Ok(ctx)
}

/// Scan, resolve, render and write.
pub async fn generate(config: &GeneratorConfig, check: bool) -> Result<GenerateReport> {
    let mut ctx = scan(config).await?;
    let mut model = ctx.freeze()?;
    let files = render(&model, config)?;
    model.mark_emitted()?;
    let write = write_files(&files, &config.output, check)?;
    info!(
        files = files.len(),
        written = write.written.len(),
        unchanged = write.unchanged,
        stale = write.stale.len(),
        "generation finished"
    );
    Ok(GenerateReport {
        files: files.len(),
        write,
        warnings: ctx.diagnostics.warnings().to_vec(),
    })
}

/// Scan and report every structural error without emitting anything.
pub async fn validate(config: &GeneratorConfig) -> Result<ValidationReport> {
    let ctx = scan(config).await?;
    let errors = ctx.validate();
    info!(errors = errors.len(), "validation finished");
    Ok(ValidationReport {
        errors,
        warnings: ctx.diagnostics.warnings().to_vec(),
    })
}
