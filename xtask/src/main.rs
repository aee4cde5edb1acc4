//! Build automation tasks for the T20I pipeline
//!
//! Currently generates the stage runner's command reference from its clap
//! definitions.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Build automation tasks for the T20I pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Generate the command reference in Markdown
    GenerateCliDocs {
        /// Output directory for generated documentation
        #[arg(short, long, default_value = "docs")]
        output_dir: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenerateCliDocs { output_dir } => generate_cli_docs(&output_dir)?,
    }

    Ok(())
}

fn generate_cli_docs(output_dir: &str) -> anyhow::Result<()> {
    println!("Generating CLI documentation...");

    let markdown = clap_markdown::help_markdown::<t20i_pipeline::cli::Cli>();

    let content = format!(
        r#"# t20i-pipeline Command Reference

This documentation is auto-generated from the CLI source code. Last updated: {}.

## Overview

`t20i-pipeline` runs one stage of the Men's T20I dataset pipeline per
invocation and prints a `{{"statusCode": ..., "body": ...}}` response. The
process exits with a non-zero code when the status code is 500.

A typical schedule:

```bash
# Daily: fetch the archive and announce new matches
t20i-pipeline ingest

# Continuously (or on each announcement): extract rows
t20i-pipeline consume --stage deliveries
t20i-pipeline consume --stage matches

# After extraction settles: publish a new dataset version
t20i-pipeline export
```

## Commands

{}

## Environment Variables

| Variable | Purpose |
|----------|---------|
| `DOWNLOAD_BUCKET_NAME` | Bucket holding raw inputs and datasets (required) |
| `STATUS_BACKEND` | `postgres` (default) or `memory` |
| `DATABASE_URL` | Postgres connection string for status and queue |
| `CRICSHEET_URL` | Source archive URL |
| `DETECTION_STRATEGY` | `status` (default) or `listing` |
| `EVENT_TRIGGER` | `bus` (default) or `storage` |
| `MAX_NEW_FILES_PER_RUN` | Cap on files announced per ingestion run |
| `QUEUE_MAX_ATTEMPTS` | Deliveries before a message is dead-lettered |
| `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID` | Status alerts; logged only when unset |
| `KAGGLE_USERNAME`, `KAGGLE_KEY`, `KAGGLE_DATASET_SLUG` | Dataset host credentials |
| `LOG_LEVEL`, `LOG_FORMAT`, `LOG_OUTPUT` | Logging |

---

*To update, run `cargo xtask generate-cli-docs`.*
"#,
        chrono::Utc::now().format("%Y-%m-%d"),
        markdown
    );

    let output_path = PathBuf::from(output_dir);
    fs::create_dir_all(&output_path)?;

    let file_path = output_path.join("cli-reference.md");
    fs::write(&file_path, content)?;

    println!("✅ Generated CLI documentation at: {}", file_path.display());

    Ok(())
}
