//! Command-line surface
//!
//! Each subcommand is one stage invocation: it prints the
//! `{statusCode, body}` response as JSON and the binary exits non-zero when
//! the status is 500.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use t20i_common::{PipelineError, Result};

use crate::bus::{DELIVERYWISE_GROUP, MATCHWISE_GROUP};
use crate::config::{KaggleConfig, PipelineConfig};
use crate::host::{DatasetHost, KaggleCli, LocalDirectoryHost};
use crate::runtime::{self, alerts_from_env, invoke, InvocationResponse, Services};

#[derive(Parser, Debug)]
#[command(name = "t20i-pipeline")]
#[command(author, version, about = "Men's T20I cricket dataset pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download the source archive and announce new match files
    Ingest,

    /// Run the delivery-wise aggregator on a trigger event
    Deliveries {
        /// JSON file holding the storage notification or bus delivery
        #[arg(short, long)]
        event: PathBuf,
    },

    /// Run the match-wise aggregator on a trigger event
    Matches {
        /// JSON file holding the storage notification or bus delivery
        #[arg(short, long)]
        event: PathBuf,
    },

    /// Drain queued announcements through one aggregator
    Consume {
        #[arg(short, long, value_enum)]
        stage: ConsumerStage,

        /// Stop after claiming this many messages
        #[arg(short, long)]
        max_messages: Option<usize>,
    },

    /// Publish both datasets as a new version on the dataset host
    Export {
        /// Store versions in a local directory instead of uploading
        #[arg(long, env = "EXPORT_LOCAL_DIR")]
        local_dir: Option<PathBuf>,
    },

    /// Re-announce incomplete inputs and requeue dead letters
    Replay,

    /// Apply database migrations
    Migrate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerStage {
    Deliveries,
    Matches,
}

impl Command {
    /// Stage name used in logs and alerts
    pub fn stage_name(&self) -> &'static str {
        match self {
            Command::Ingest => "ingest",
            Command::Deliveries { .. } => "deliverywise",
            Command::Matches { .. } => "matchwise",
            Command::Consume {
                stage: ConsumerStage::Deliveries,
                ..
            } => "deliverywise-consumer",
            Command::Consume {
                stage: ConsumerStage::Matches,
                ..
            } => "matchwise-consumer",
            Command::Export { .. } => "export",
            Command::Replay => "replay",
            Command::Migrate => "migrate",
        }
    }
}

/// Run one command inside the invocation wrapper
pub async fn execute(command: Command) -> InvocationResponse {
    let alerts = alerts_from_env();
    let stage = command.stage_name();
    invoke(stage, alerts.as_ref(), run(command)).await
}

async fn run(command: Command) -> Result<String> {
    let config = PipelineConfig::from_env()?;

    if let Command::Migrate = command {
        return runtime::migrate(&config).await;
    }

    // Export credentials are checked before any collaborator is touched
    let export_target = match &command {
        Command::Export { local_dir } => Some(export_target(local_dir.as_deref())?),
        _ => None,
    };

    let services = Services::connect(config).await?;

    match command {
        Command::Ingest => runtime::ingest(&services).await,
        Command::Deliveries { event } => {
            let event = read_event(&event).await?;
            runtime::aggregate(&services, &services.deliverywise(), &event).await
        },
        Command::Matches { event } => {
            let event = read_event(&event).await?;
            runtime::aggregate(&services, &services.matchwise(), &event).await
        },
        Command::Consume {
            stage: ConsumerStage::Deliveries,
            max_messages,
        } => {
            runtime::consume(&services, services.deliverywise(), DELIVERYWISE_GROUP, max_messages)
                .await
        },
        Command::Consume {
            stage: ConsumerStage::Matches,
            max_messages,
        } => {
            runtime::consume(&services, services.matchwise(), MATCHWISE_GROUP, max_messages).await
        },
        Command::Export { .. } => {
            let (host, dataset_id) = export_target.ok_or_else(|| {
                PipelineError::ConfigurationMissing("export target not resolved".to_string())
            })?;
            runtime::export(&services, host, &dataset_id).await
        },
        Command::Replay => runtime::replay_incomplete(&services).await,
        Command::Migrate => runtime::migrate(&services.config).await,
    }
}

fn export_target(local_dir: Option<&Path>) -> Result<(Arc<dyn DatasetHost>, String)> {
    match local_dir {
        Some(dir) => {
            let dataset_id = KaggleConfig::from_env()
                .map(|k| k.dataset_id())
                .unwrap_or_else(|_| "local/t20i-dataset".to_string());
            Ok((Arc::new(LocalDirectoryHost::new(dir)), dataset_id))
        },
        None => {
            let kaggle = KaggleConfig::from_env()?;
            let dataset_id = kaggle.dataset_id();
            Ok((Arc::new(KaggleCli::new(kaggle)), dataset_id))
        },
    }
}

async fn read_event(path: &Path) -> Result<Value> {
    let text = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&text).map_err(|e| {
        PipelineError::malformed(path.display().to_string(), format!("invalid event JSON: {}", e))
    })
}
