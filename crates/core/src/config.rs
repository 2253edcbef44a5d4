//! Generator configuration from `rpcgen.yml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{GenError, Result};

/// Default project file name.
pub const CONFIG_FILE: &str = "rpcgen.yml";

/// Output backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// C handler stubs, structs and dispatch tables.
    Native,
    /// Swift SDK.
    Swift,
    /// Markdown reference pages.
    Docs,
    /// Test-case JSON.
    Testcases,
    /// CLI help blob and shell completion.
    Cli,
}

impl BackendKind {
    /// Every backend, in emission order.
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Native,
        BackendKind::Swift,
        BackendKind::Docs,
        BackendKind::Testcases,
        BackendKind::Cli,
    ];

    /// Lowercase name as used in config files and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Swift => "swift",
            BackendKind::Docs => "docs",
            BackendKind::Testcases => "testcases",
            BackendKind::Cli => "cli",
        }
    }

    /// Parse a backend name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// Settings of the native backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NativeConfig {
    /// Prefix of every emitted C symbol.
    pub prefix: String,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            prefix: "rpc".to_string(),
        }
    }
}

/// Settings of the Swift backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SwiftConfig {
    /// Swift module name.
    pub module: String,
}

impl Default for SwiftConfig {
    fn default() -> Self {
        Self {
            module: "RpcSdk".to_string(),
        }
    }
}

/// Settings of the docs backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    /// Title of the reference.
    pub title: String,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            title: "API Reference".to_string(),
        }
    }
}

/// Settings of the CLI backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Program name in help text and completion.
    pub program: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            program: "rpc".to_string(),
        }
    }
}

/// Everything a generator run needs besides the schemas themselves.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Directories scanned for schema and test files.
    pub sources: Vec<PathBuf>,
    /// Output root.
    pub output: PathBuf,
    /// Enabled backends.
    pub backends: Vec<BackendKind>,
    /// Native backend settings.
    pub native: NativeConfig,
    /// Swift backend settings.
    pub swift: SwiftConfig,
    /// Docs backend settings.
    pub docs: DocsConfig,
    /// CLI backend settings.
    pub cli: CliConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sources: vec![PathBuf::from(".")],
            output: PathBuf::from("generated"),
            backends: BackendKind::ALL.to_vec(),
            native: NativeConfig::default(),
            swift: SwiftConfig::default(),
            docs: DocsConfig::default(),
            cli: CliConfig::default(),
        }
    }
}

impl GeneratorConfig {
    /// Parse a config document.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|source| GenError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`. A missing file yields defaults unless `required`.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "loaded generator config");
                let mut config = Self::from_yaml(&text, path)?;
                config.relative_to(path.parent().unwrap_or_else(|| Path::new("")));
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
                debug!(path = %path.display(), "no generator config, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(GenError::io(path, err)),
        }
    }

    /// Resolve relative source and output paths against `base`.
    fn relative_to(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        for source in &mut self.sources {
            if source.is_relative() {
                *source = base.join(&*source);
            }
        }
        if self.output.is_relative() {
            self.output = base.join(&self.output);
        }
    }

    /// Whether a backend is enabled.
    pub fn enabled(&self, backend: BackendKind) -> bool {
        self.backends.contains(&backend)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GeneratorConfig::from_yaml("", Path::new("rpcgen.yml")).unwrap();
        assert_eq!(config.sources, vec![PathBuf::from(".")]);
        assert_eq!(config.output, PathBuf::from("generated"));
        assert_eq!(config.backends.len(), 5);
        assert_eq!(config.native.prefix, "rpc");
        assert_eq!(config.swift.module, "RpcSdk");
        assert_eq!(config.docs.title, "API Reference");
        assert_eq!(config.cli.program, "rpc");
    }

    #[test]
    fn test_partial_override() {
        let config = GeneratorConfig::from_yaml(
            "backends: [native, docs]\nnative:\n  prefix: eth\nswift: {}\n",
            Path::new("rpcgen.yml"),
        )
        .unwrap();
        assert!(config.enabled(BackendKind::Native));
        assert!(!config.enabled(BackendKind::Swift));
        assert_eq!(config.native.prefix, "eth");
        assert_eq!(config.swift.module, "RpcSdk");
    }

    #[test]
    fn test_unknown_backend_is_an_error() {
        let err = GeneratorConfig::from_yaml("backends: [java]\n", Path::new("cfg.yml")).unwrap_err();
        assert!(err.to_string().contains("cfg.yml"));
    }

    #[test]
    fn test_load_missing_and_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("rpcgen.yml");
        assert!(GeneratorConfig::load(&missing, false).is_ok());
        assert!(GeneratorConfig::load(&missing, true).is_err());

        std::fs::write(&missing, "sources: [schemas]\noutput: out\n").unwrap();
        let config = GeneratorConfig::load(&missing, true).unwrap();
        assert_eq!(config.sources, vec![dir.path().join("schemas")]);
        assert_eq!(config.output, dir.path().join("out"));
    }

    #[test]
    fn test_backend_names() {
        for backend in BackendKind::ALL {
            assert_eq!(BackendKind::parse(backend.name()), Some(backend));
        }
        assert_eq!(BackendKind::parse("java"), None);
    }
}
