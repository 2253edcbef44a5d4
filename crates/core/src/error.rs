//! Error types for scanning, importing and emitting.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the generator.
pub type Result<T, E = GenError> = std::result::Result<T, E>;

/// Fatal generator error.
///
/// Every variant carries enough context (file, group, method, field path)
/// to locate the offending schema entry.
#[derive(Debug, Error)]
pub enum GenError {
    /// A type name is neither registered nor a known primitive.
    #[error("unknown type '{name}' at {path}")]
    UnknownType {
        /// The unresolvable type name.
        name: String,
        /// Dotted path `group.method.param[.field...]`.
        path: String,
    },

    /// `_extends` chain loops back on itself.
    #[error("_extends cycle: {chain}")]
    ExtendsCycle {
        /// Chain of type names, `A -> B -> A`.
        chain: String,
    },

    /// Two methods ended up with the same name.
    #[error("duplicate function name '{name}' ({context})")]
    DuplicateFunction {
        /// The colliding method name.
        name: String,
        /// Where the second definition came from.
        context: String,
    },

    /// Structural dedup could not find a free numeric suffix.
    #[error("no free name for type '{base}' after trying suffixes 1..999")]
    SuffixExhausted {
        /// The base name that kept colliding.
        base: String,
    },

    /// Two fields (or params) would map to the same emitted identifier.
    #[error("dispatch key collision in '{owner}': '{first}' and '{second}' both map to '{ident}'")]
    DispatchCollision {
        /// Owning type or method.
        owner: String,
        /// First field name.
        first: String,
        /// Second field name.
        second: String,
        /// The shared identifier.
        ident: String,
    },

    /// An alias points to a method that does not exist.
    #[error("method '{method}' aliases unknown method '{target}'")]
    UnknownAlias {
        /// The aliasing method.
        method: String,
        /// The missing target.
        target: String,
    },

    /// An alias points to another alias.
    #[error("method '{method}' aliases '{target}', which is itself an alias")]
    AliasChain {
        /// The aliasing method.
        method: String,
        /// The aliased alias.
        target: String,
    },

    /// A generated alias points to a method with `skipGenerate` set.
    #[error("method '{method}' aliases '{target}', which is marked skipGenerate")]
    AliasOfSkipped {
        /// The aliasing method.
        method: String,
        /// The skipped target.
        target: String,
    },

    /// A test case declares neither `expected_output` nor `expected_failure`.
    #[error(
        "test case #{index} of '{method}' in {} has neither expected_output nor expected_failure",
        file.display()
    )]
    MissingExpectation {
        /// The method under test.
        method: String,
        /// Zero-based index within the method's case list.
        index: usize,
        /// The declaring file.
        file: PathBuf,
    },

    /// An RPC build stage was advanced out of order.
    #[error("method '{method}' cannot move from {from:?} to {to:?}")]
    StageOrder {
        /// The method being built.
        method: String,
        /// Current stage.
        from: crate::model::BuildStage,
        /// Requested stage.
        to: crate::model::BuildStage,
    },

    /// Importer failure, wrapped with the directive that triggered it.
    #[error("{context}: {source}")]
    Import {
        /// `file: group` that declared the `generate_rpc` directive.
        context: String,
        /// The adapter error.
        #[source]
        source: ImportError,
    },

    /// A backend met something it cannot represent.
    #[error("{backend} backend: {message}")]
    Backend {
        /// Backend name.
        backend: &'static str,
        /// What went wrong, including the method/field path.
        message: String,
    },

    /// Template rendering failure.
    #[error("template '{name}': {source}")]
    Template {
        /// Template name.
        name: String,
        /// Tera error.
        #[source]
        source: tera::Error,
    },

    /// YAML parse failure with file context.
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        /// The offending file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: serde_yaml::Error,
    },

    /// I/O failure with file context.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `--check` found generated files that are stale.
    #[error("{count} generated file(s) out of date")]
    Stale {
        /// Number of differing or missing files.
        count: usize,
    },
}

impl GenError {
    /// Creates a backend error.
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }

    /// Wraps an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the OpenAPI and Solidity importers.
#[derive(Debug, Error)]
pub enum ImportError {
    /// HTTP fetch of an OpenAPI document failed.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Transport or status error.
        message: String,
    },

    /// Reading a local document failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Document extension is neither JSON nor YAML.
    #[error("unsupported document extension: {0}")]
    UnsupportedExtension(String),

    /// Document did not parse.
    #[error("failed to parse {location}: {message}")]
    Parse {
        /// Path or URL.
        location: String,
        /// Parser message.
        message: String,
    },

    /// `$ref` could not be followed.
    #[error("cannot resolve $ref '{reference}': {message}")]
    Ref {
        /// The reference string.
        reference: String,
        /// Why it failed.
        message: String,
    },

    /// Operation has no usable success response.
    #[error("{method} {path}: no success response")]
    MissingResponse {
        /// HTTP method.
        method: String,
        /// Path template.
        path: String,
    },

    /// Two example values disagree on a property type.
    #[error("{location}: example property '{property}' inferred as both {first} and {second}")]
    ConflictingInference {
        /// Owning schema location.
        location: String,
        /// Property name.
        property: String,
        /// First inferred type.
        first: String,
        /// Conflicting inferred type.
        second: String,
    },

    /// Generated method name collides even after `_by_<param>`.
    #[error("duplicate function name '{name}' for {method} {path}")]
    DuplicateFunction {
        /// The colliding name.
        name: String,
        /// HTTP method.
        method: String,
        /// Path template.
        path: String,
    },

    /// Structural dedup exhausted its suffix range.
    #[error("no free name for type '{0}' after trying suffixes 1..999")]
    SuffixExhausted(String),

    /// solc reported errors.
    #[error("solidity compilation failed:\n{}", messages.join("\n"))]
    Solidity {
        /// `formattedMessage` of every error-severity entry.
        messages: Vec<String>,
    },

    /// A schema file declares a type the importer needs for its own shape.
    #[error("type '{0}' is reserved for imported transaction results but is declared with other fields")]
    ReservedType(String),

    /// Contract not present in the compiler output.
    #[error("contract '{0}' not found in compiler output")]
    MissingContract(String),

    /// Running solc failed.
    #[error("failed to run solc: {0}")]
    Compiler(String),
}
