//! T20I pipeline - stage runner

use anyhow::Result;
use clap::Parser;
use t20i_common::logging::{init_logging, LogConfig, LogLevel};
use t20i_pipeline::cli::{execute, Cli};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("t20i-pipeline")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    info!(stage = cli.command.stage_name(), "Starting invocation");
    let response = execute(cli.command).await;

    println!("{}", serde_json::to_string(&response)?);

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
