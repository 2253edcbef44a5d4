use clap::Args;
use rpcgen_core::{BackendKind, generate};
use std::path::PathBuf;
use tracing::debug;

use crate::cli::common::{SourceArgs, parse_backend};
use crate::cli::run_cli_async;

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[arg(
        long = "out",
        value_name = "DIR",
        help = "Output directory. Overrides `output` from the project file"
    )]
    pub out: Option<PathBuf>,
    #[arg(
        long = "backend",
        value_name = "NAME",
        value_parser = parse_backend,
        help = "Backend to run (native, swift, docs, testcases, cli). Repeatable; defaults to the project file's list"
    )]
    pub backends: Vec<BackendKind>,
    #[arg(
        long = "check",
        help = "Write nothing; fail with a diff when generated files are out of date"
    )]
    pub check: bool,
}

pub async fn run(args: GenerateArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(args: GenerateArgs) -> Result<(), String> {
    let mut config = args.source.load()?;
    if let Some(out) = args.out {
        config.output = out;
    }
    if !args.backends.is_empty() {
        config.backends = args.backends;
    }
    debug!(backends = ?config.backends, check = args.check, "Running generator");

    let report = generate(&config, args.check)
        .await
        .map_err(|err| err.to_string())?;

    if args.check {
        for stale in &report.write.stale {
            print!("{}", stale.diff);
        }
        report.write.ensure_fresh().map_err(|err| err.to_string())?;
        println!(
            "{} generated file(s) in {} are up to date",
            report.files,
            config.output.display()
        );
        return Ok(());
    }

    println!(
        "Generated {} file(s) in {} ({} written, {} unchanged)",
        report.files,
        config.output.display(),
        report.write.written.len(),
        report.write.unchanged
    );
    if !report.warnings.is_empty() {
        println!("{} warning(s)", report.warnings.len());
    }
    Ok(())
}
