//! samctr CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use samctr::cli::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.global.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("samctr={level}").parse()?)
                .add_directive(format!("sam_common={level}").parse()?),
        )
        .init();

    // Execute command
    cli.execute().await
}
