use std::process::ExitCode;

use clap::Parser;
use idl_index::cli::{self, Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the protocol stream
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve => {
            idl_index::server::serve().await;
            ExitCode::SUCCESS
        }
        Command::Check { roots, json } => {
            let mut stdout = std::io::stdout().lock();
            match cli::check(&roots, json, &mut stdout) {
                Ok(summary) if summary.failed > 0 => ExitCode::from(2),
                Ok(summary) if summary.errors > 0 => ExitCode::FAILURE,
                Ok(_) => ExitCode::SUCCESS,
                Err(err) => {
                    eprintln!("idl-index check failed: {err:#}");
                    ExitCode::from(2)
                }
            }
        }
    }
}
