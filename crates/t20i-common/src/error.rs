//! Error types for the T20I pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The input document is missing required structure. Reprocessing the
    /// same bytes yields the same error, so this is never retried.
    #[error("Malformed record {input}: {reason}")]
    MalformedRecord { input: String, reason: String },

    /// A storage, network or bus call failed and may succeed on redelivery.
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    /// A conditional dataset write kept losing to concurrent writers.
    #[error("Concurrent modification of {key} after {attempts} attempts")]
    ConcurrentModification { key: String, attempts: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::MalformedRecord {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(err: impl std::fmt::Display) -> Self {
        PipelineError::TransientIo(err.to_string())
    }

    /// Whether the message-delivery layer should redeliver after this error
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::MalformedRecord { .. }
            | PipelineError::ConfigurationMissing(_)
            | PipelineError::EmptyDataset(_) => false,
            PipelineError::TransientIo(_)
            | PipelineError::ConcurrentModification { .. }
            | PipelineError::Io(_)
            | PipelineError::Serialization(_)
            | PipelineError::Csv(_) => true,
        }
    }

    /// Short machine-readable kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MalformedRecord { .. } => "malformed_record",
            PipelineError::TransientIo(_) => "transient_io",
            PipelineError::ConfigurationMissing(_) => "configuration_missing",
            PipelineError::EmptyDataset(_) => "empty_dataset",
            PipelineError::ConcurrentModification { .. } => "concurrent_modification",
            PipelineError::Io(_) => "io",
            PipelineError::Serialization(_) => "serialization",
            PipelineError::Csv(_) => "csv",
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<PipelineError>() {
            Ok(inner) => inner,
            Err(other) => PipelineError::TransientIo(format!("{:#}", other)),
        }
    }
}
