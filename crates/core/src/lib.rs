//! rpcgen engine.
//!
//! Scans YAML schema and test files (plus OpenAPI and Solidity sources named
//! by `generate_rpc` directives) into a [`driver::ScanContext`], freezes it into
//! a [`resolved::ResolvedModel`] and renders native C stubs, a Swift SDK,
//! Markdown docs, test-case JSON and CLI help from it.

pub mod backend;
pub mod config;
pub mod driver;
pub mod emit;
pub mod error;
pub mod import;
pub mod model;
pub mod primitive;
pub mod registry;
pub mod resolved;

pub use backend::{Backend, FileSet};
pub use config::{BackendKind, CONFIG_FILE, GeneratorConfig};
pub use driver::{
    Diagnostics, GenerateReport, ScanContext, StaleFile, ValidationReport, WriteReport, generate,
    render, validate, write_files,
};
pub use error::{GenError, ImportError, Result};
pub use resolved::ResolvedModel;
