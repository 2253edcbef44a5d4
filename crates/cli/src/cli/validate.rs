use clap::Args;
use rpcgen_core::validate;

use crate::cli::common::SourceArgs;
use crate::cli::run_cli_async;

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

pub async fn run(args: ValidateArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(args: ValidateArgs) -> Result<(), String> {
    let config = args.source.load()?;
    let report = validate(&config).await.map_err(|err| err.to_string())?;

    for err in &report.errors {
        eprintln!("error: {err}");
    }
    if !report.errors.is_empty() {
        return Err(format!("{} validation error(s)", report.errors.len()));
    }
    println!("Schemas are valid");
    Ok(())
}
