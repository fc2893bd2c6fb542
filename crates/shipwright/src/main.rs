//! shipwright command line entry point.

mod cli;
mod commands;
mod shutdown;
mod tracing;

use crate::cli::{Cli, Commands};
use crate::tracing::{Level, TracingConfig};
use std::io::Write;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::parse();
    if let Err(error) = run(cli).await {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("{error:?}");
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> miette::Result<()> {
    crate::tracing::init_tracing(TracingConfig {
        format: cli.log_format,
        level: if cli.debug { Level::DEBUG } else { Level::INFO },
        filter: None,
    })?;

    match cli.command {
        Commands::Release(args) => commands::release(args).await,
        Commands::Check { config, print } => {
            if let Some(rendered) = commands::check(config.as_deref(), print)? {
                std::io::stdout()
                    .write_all(rendered.as_bytes())
                    .map_err(|e| miette::miette!("Failed to write to stdout: {e}"))?;
            }
            Ok(())
        }
        Commands::Init { config } => commands::init(&config),
    }
}
