//! Configuration management
//!
//! Stages are configured from the process environment (with `.env` support
//! for local runs). Required values are checked when a stage starts, before
//! any collaborator is touched.

use serde::{Deserialize, Serialize};
use t20i_common::{PipelineError, Result};

use crate::storage::config::StorageConfig;

// ============================================================================
// Pipeline Constants
// ============================================================================

/// Men's T20I archive published by Cricsheet.
pub const DEFAULT_CRICSHEET_URL: &str = "https://cricsheet.org/downloads/t20s_male_json.zip";

/// Root folder for everything the pipeline stores.
pub const CRICSHEET_DATA_FOLDER: &str = "cricsheet_data";

/// Folder (under the root) holding raw match documents awaiting extraction.
pub const NEW_FILES_FOLDER: &str = "new_cricsheet_data";

/// Folder (under the root) holding an empty marker per announced file.
/// A marker is only written once the announcement is on the bus.
pub const ANNOUNCED_FOLDER: &str = "announced_cricsheet_data";

/// Folder (under the root) holding the cumulative CSV datasets.
pub const OUTPUT_FOLDER: &str = "output";

pub const DELIVERYWISE_CSV_FILE_NAME: &str = "deliverywise_data.csv";
pub const MATCHWISE_CSV_FILE_NAME: &str = "matchwise_data.csv";

/// Topic carrying one message per newly stored raw input.
pub const NEW_MATCH_FILES_TOPIC: &str = "new-match-files";

/// Default redelivery limit before a message is dead-lettered.
pub const DEFAULT_QUEUE_MAX_ATTEMPTS: u32 = 3;

/// Default page size when scanning the status store.
pub const DEFAULT_STATUS_SCAN_PAGE_SIZE: usize = 100;

/// Default number of optimistic write attempts per dataset merge.
pub const DEFAULT_DATASET_WRITE_ATTEMPTS: u32 = 5;

/// Which backend holds processing status and the message queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Postgres,
    Memory,
}

impl std::str::FromStr for Backend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            "memory" => Ok(Backend::Memory),
            _ => Err(PipelineError::ConfigurationMissing(format!(
                "STATUS_BACKEND must be 'postgres' or 'memory', got '{}'",
                s
            ))),
        }
    }
}

/// How the Ingestion stage decides which archive entries are new
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Absent from the processing-status store (authoritative)
    #[default]
    Status,
    /// Absent from the raw-input listing in object storage
    Listing,
}

impl std::str::FromStr for DetectionStrategy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "status" => Ok(DetectionStrategy::Status),
            "listing" => Ok(DetectionStrategy::Listing),
            _ => Err(PipelineError::ConfigurationMissing(format!(
                "DETECTION_STRATEGY must be 'status' or 'listing', got '{}'",
                s
            ))),
        }
    }
}

/// Which trigger payload shape the aggregator stages receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventTrigger {
    /// Storage-write notification (object key in the event detail)
    Storage,
    /// Message-bus delivery (key and match ID in the message body)
    #[default]
    Bus,
}

impl std::str::FromStr for EventTrigger {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "storage" | "eventbridge" => Ok(EventTrigger::Storage),
            "bus" | "sns" => Ok(EventTrigger::Bus),
            _ => Err(PipelineError::ConfigurationMissing(format!(
                "EVENT_TRIGGER must be 'storage' or 'bus', got '{}'",
                s
            ))),
        }
    }
}

/// Telegram alert credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    /// Both variables must be set; otherwise alerts are only logged
    pub fn from_env() -> Option<Self> {
        match (optional("TELEGRAM_BOT_TOKEN"), optional("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(Self { bot_token, chat_id }),
            _ => None,
        }
    }
}

/// Dataset host credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KaggleConfig {
    pub username: String,
    pub key: String,
    pub dataset_slug: String,
}

impl KaggleConfig {
    /// Dataset reference used in `dataset-metadata.json`
    pub fn dataset_id(&self) -> String {
        format!("{}/{}", self.username, self.dataset_slug)
    }

    pub fn from_env() -> Result<Self> {
        Ok(Self {
            username: required("KAGGLE_USERNAME")?,
            key: required("KAGGLE_KEY")?,
            dataset_slug: required("KAGGLE_DATASET_SLUG")?,
        })
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub backend: Backend,
    pub database_url: Option<String>,
    pub cricsheet_url: String,
    pub detection: DetectionStrategy,
    pub trigger: EventTrigger,
    /// Throttle for how many new files one Ingestion run forwards
    pub max_new_files_per_run: Option<usize>,
    pub queue_max_attempts: u32,
    pub status_scan_page_size: usize,
    pub dataset_write_attempts: u32,
    pub telegram: Option<TelegramConfig>,
}

impl PipelineConfig {
    /// Load configuration from environment and defaults
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let backend = optional("STATUS_BACKEND")
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or_default();

        let config = Self {
            storage: StorageConfig::from_env()?,
            backend,
            database_url: optional("DATABASE_URL"),
            cricsheet_url: optional("CRICSHEET_URL")
                .unwrap_or_else(|| DEFAULT_CRICSHEET_URL.to_string()),
            detection: optional("DETECTION_STRATEGY")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            trigger: optional("EVENT_TRIGGER")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
            max_new_files_per_run: parsed("MAX_NEW_FILES_PER_RUN")?,
            queue_max_attempts: parsed("QUEUE_MAX_ATTEMPTS")?
                .unwrap_or(DEFAULT_QUEUE_MAX_ATTEMPTS),
            status_scan_page_size: parsed("STATUS_SCAN_PAGE_SIZE")?
                .unwrap_or(DEFAULT_STATUS_SCAN_PAGE_SIZE),
            dataset_write_attempts: parsed("DATASET_WRITE_ATTEMPTS")?
                .unwrap_or(DEFAULT_DATASET_WRITE_ATTEMPTS),
            telegram: TelegramConfig::from_env(),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.bucket.is_empty() {
            return Err(PipelineError::ConfigurationMissing(
                "DOWNLOAD_BUCKET_NAME cannot be empty".to_string(),
            ));
        }

        if self.backend == Backend::Postgres && self.database_url.is_none() {
            return Err(PipelineError::ConfigurationMissing(
                "DATABASE_URL is required when STATUS_BACKEND=postgres".to_string(),
            ));
        }

        if self.queue_max_attempts == 0 {
            return Err(PipelineError::ConfigurationMissing(
                "QUEUE_MAX_ATTEMPTS must be greater than 0".to_string(),
            ));
        }

        if self.status_scan_page_size == 0 {
            return Err(PipelineError::ConfigurationMissing(
                "STATUS_SCAN_PAGE_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.telegram.is_none() {
            tracing::warn!("Telegram credentials not configured - alerts will only be logged");
        }

        Ok(())
    }

    /// Database URL, required for the Postgres backend
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            PipelineError::ConfigurationMissing("DATABASE_URL is not set".to_string())
        })
    }
}

/// Key of a raw match document awaiting extraction
pub fn raw_input_key(file_name: &str) -> String {
    format!("{}/{}/{}", CRICSHEET_DATA_FOLDER, NEW_FILES_FOLDER, file_name)
}

/// Key of the marker recording that a file's announcement was published
pub fn announced_marker_key(file_name: &str) -> String {
    format!("{}/{}/{}", CRICSHEET_DATA_FOLDER, ANNOUNCED_FOLDER, file_name)
}

pub fn announced_marker_prefix() -> String {
    format!("{}/{}/", CRICSHEET_DATA_FOLDER, ANNOUNCED_FOLDER)
}

pub fn deliverywise_dataset_key() -> String {
    format!("{}/{}/{}", CRICSHEET_DATA_FOLDER, OUTPUT_FOLDER, DELIVERYWISE_CSV_FILE_NAME)
}

pub fn matchwise_dataset_key() -> String {
    format!("{}/{}/{}", CRICSHEET_DATA_FOLDER, OUTPUT_FOLDER, MATCHWISE_CSV_FILE_NAME)
}

/// Read a required environment variable
pub fn required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => {
            tracing::error!(variable = name, "Environment variable is not set");
            Err(PipelineError::ConfigurationMissing(format!(
                "Environment variable {} is not set",
                name
            )))
        },
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match optional(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            PipelineError::ConfigurationMissing(format!("{} has an invalid value: {}", name, raw))
        }),
    }
}
