//! devkit — multi-agent development environment orchestrator.

use clap::Parser;

use devkit_cli::cli::Cli;
use devkit_cli::domain::error::{ConfigError, RunnerError, UsageError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tokio::select! {
        result = cli.run() => {
            if let Err(e) = result {
                eprintln!("{e:#}");
                std::process::exit(exit_code(&e));
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted");
            std::process::exit(130);
        }
    }
}

/// Exit protocol: 2 for misuse/config errors, the child's code for runtime
/// failures, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<UsageError>().is_some() || err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    if let Some(RunnerError::NonZero { code, .. }) = err.downcast_ref::<RunnerError>() {
        return *code;
    }
    1
}
