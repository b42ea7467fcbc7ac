use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    lectern::logging::init("warn").context("init logging")?;

    let cli = lectern::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        lectern::cli::Command::Catalog { command } => {
            lectern::commands::run(command).await.context("catalog")?;
        }
    }

    Ok(())
}
