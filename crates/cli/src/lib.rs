//! Command-line front end of rpcgen.

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod cli;

/// Crates whose logs a plain `RPCGEN_LOG` level applies to.
const LOG_TARGETS: [&str; 3] = ["rpcgen_core", "rpcgen_cli", "rpcgen"];

#[derive(Parser)]
#[command(
    name = "rpcgen",
    version,
    about = "Generate native stubs, a Swift SDK, docs and test cases from JSON-RPC schemas"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate every enabled output
    Generate(cli::generate::GenerateArgs),
    /// Check schemas and test cases without generating anything
    Validate(cli::validate::ValidateArgs),
}

/// Parse `args` (program name first) and run the command. Returns the exit code.
pub fn run_cli(args: Vec<String>) -> i32 {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to create tokio runtime: {err}");
            return 1;
        }
    };

    runtime.block_on(run_cli_async(args))
}

async fn run_cli_async(args: Vec<String>) -> i32 {
    match Cli::try_parse_from(args) {
        Ok(cli) => match cli.command {
            Some(Commands::Generate(args)) => cli::generate::run(args).await,
            Some(Commands::Validate(args)) => cli::validate::run(args).await,
            None => {
                let mut cmd = Cli::command();
                let _ = cmd.print_help();
                println!();
                0
            }
        },
        Err(e) => {
            let code = e.exit_code();
            let _ = e.print();
            code
        }
    }
}

/// Install the stderr subscriber.
pub fn init_tracing() {
    // RPCGEN_LOG controls log level: "trace", "debug", "info", "warn", "error"
    // or a full tracing filter spec like "rpcgen_core=debug,reqwest=warn"
    let filter = match std::env::var("RPCGEN_LOG") {
        Ok(level) if is_plain_level(&level) => targets_at(&level),
        Ok(spec) => spec,
        Err(_) => targets_at("info"),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_filter(EnvFilter::new(filter));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn targets_at(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn is_plain_level(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_levels() {
        assert!(is_plain_level("debug"));
        assert!(is_plain_level("WARN"));
        assert!(!is_plain_level("rpcgen_core=debug"));
    }

    #[test]
    fn test_targets_at() {
        assert_eq!(
            targets_at("debug"),
            "rpcgen_core=debug,rpcgen_cli=debug,rpcgen=debug"
        );
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_usage_error_exit_code() {
        assert_eq!(run_cli(vec!["rpcgen".into(), "--bogus".into()]), 2);
        assert_eq!(run_cli(vec!["rpcgen".into()]), 0);
    }
}
