use clap::Args;
use rpcgen_core::{BackendKind, CONFIG_FILE, GeneratorConfig};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(
        long = "config",
        value_name = "FILE",
        help = "Path to the project file. Defaults to rpcgen.yml in the working directory"
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long = "source",
        value_name = "DIR",
        help = "Directory with schema and test files. Repeatable; replaces `sources` from the project file"
    )]
    pub sources: Vec<PathBuf>,
}

impl SourceArgs {
    /// Load the project file and apply the source overrides.
    pub fn load(&self) -> Result<GeneratorConfig, String> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::load(path, true),
            None => GeneratorConfig::load(Path::new(CONFIG_FILE), false),
        }
        .map_err(|err| err.to_string())?;
        if !self.sources.is_empty() {
            config.sources.clone_from(&self.sources);
        }
        debug!(sources = ?config.sources, output = %config.output.display(), "effective config");
        Ok(config)
    }
}

pub fn parse_backend(name: &str) -> Result<BackendKind, String> {
    BackendKind::parse(name).ok_or_else(|| {
        let known: Vec<&str> = BackendKind::ALL.iter().map(|b| b.name()).collect();
        format!("unknown backend '{name}' (expected one of: {})", known.join(", "))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!(parse_backend("swift").unwrap(), BackendKind::Swift);
        let err = parse_backend("java").unwrap_err();
        assert!(err.contains("native, swift, docs, testcases, cli"));
    }

    #[test]
    fn test_source_override() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("project.yml");
        std::fs::write(&file, "sources: [a, b]\noutput: gen\n").unwrap();

        let args = SourceArgs {
            config: Some(file.clone()),
            sources: vec![],
        };
        assert_eq!(
            args.load().unwrap().sources,
            vec![dir.path().join("a"), dir.path().join("b")]
        );

        let args = SourceArgs {
            config: Some(file),
            sources: vec![PathBuf::from("schemas")],
        };
        let config = args.load().unwrap();
        assert_eq!(config.sources, vec![PathBuf::from("schemas")]);
        assert_eq!(config.output, dir.path().join("gen"));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let args = SourceArgs {
            config: Some(dir.path().join("missing.yml")),
            sources: vec![],
        };
        assert!(args.load().unwrap_err().contains("missing.yml"));
    }
}
