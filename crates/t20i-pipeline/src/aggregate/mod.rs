//! Aggregators
//!
//! An aggregator takes a batch of raw inputs, parses each one, merges the
//! extracted rows into its cumulative dataset in a single keyed write, and
//! only then flips its own completion flag for every input it merged.
//!
//! Failure policy:
//! - a malformed input is reported and left unmarked; its siblings still go
//!   through
//! - a storage or dataset-write failure aborts the whole batch before any
//!   status is touched, so redelivery repeats the batch safely

use std::marker::PhantomData;
use std::sync::Arc;
use t20i_common::{DatasetRecord, MatchId, PipelineError, Result, StatusField};
use tracing::{error, info, instrument, warn};

use crate::cricsheet::{parse_match, ParsedMatch};
use crate::dataset::Dataset;
use crate::status::StatusStore;
use crate::storage::ObjectStore;

pub mod deliverywise;
pub mod matchwise;

pub use deliverywise::DeliverywiseExtraction;
pub use matchwise::MatchwiseExtraction;

/// A raw input resolved from a trigger event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRef {
    /// Object key of the raw match document
    pub key: String,
    pub match_id: MatchId,
}

impl InputRef {
    pub fn new(key: impl Into<String>, match_id: MatchId) -> Self {
        Self {
            key: key.into(),
            match_id,
        }
    }

    /// Status-store identifier (the bare file name)
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Inputs resolved from one trigger event, plus the parts of the event
/// that could not be resolved to an input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputBatch {
    pub inputs: Vec<InputRef>,
    pub rejected: Vec<FailedInput>,
}

impl From<Vec<InputRef>> for InputBatch {
    fn from(inputs: Vec<InputRef>) -> Self {
        Self {
            inputs,
            rejected: Vec::new(),
        }
    }
}

/// What one aggregator extracts and where it keeps it
pub trait Extraction: Send + Sync + 'static {
    type Record: DatasetRecord;

    /// Stage name used in logs and alerts
    const STAGE: &'static str;

    /// Completion flag owned by this aggregator
    const FIELD: StatusField;

    fn rows(parsed: ParsedMatch) -> Vec<Self::Record>;

    /// Whole-dataset pass applied after every merge
    fn finalize(_rows: &mut Vec<Self::Record>) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedInput {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of one aggregator run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationReport {
    pub stage: &'static str,
    /// Inputs merged and marked complete in this run
    pub processed: Vec<String>,
    /// Inputs already marked complete before this run
    pub skipped: Vec<String>,
    pub failed: Vec<FailedInput>,
    pub rows_merged: usize,
    /// Dataset row count after the write; `None` when nothing was written
    pub dataset_rows: Option<usize>,
}

impl AggregationReport {
    pub fn summary(&self) -> String {
        let mut text = format!(
            "{} extraction: {} processed, {} skipped, {} failed",
            self.stage,
            self.processed.len(),
            self.skipped.len(),
            self.failed.len()
        );
        if let Some(rows) = self.dataset_rows {
            text.push_str(&format!(
                "; merged {} rows, dataset now has {} rows",
                self.rows_merged, rows
            ));
        }
        text
    }

    /// Turn per-input parse failures into an error after the rest of the
    /// batch has been committed
    pub fn into_result(self) -> Result<String> {
        if self.failed.is_empty() {
            return Ok(self.summary());
        }

        let inputs: Vec<&str> = self.failed.iter().map(|f| f.file_name.as_str()).collect();
        let reasons: Vec<&str> = self.failed.iter().map(|f| f.reason.as_str()).collect();
        Err(PipelineError::malformed(inputs.join(", "), reasons.join("; ")))
    }
}

/// Runs one [`Extraction`] against storage and the status store
pub struct Aggregator<E: Extraction> {
    objects: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusStore>,
    dataset: Dataset<E::Record>,
    _extraction: PhantomData<fn() -> E>,
}

impl<E: Extraction> Aggregator<E> {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusStore>,
        dataset_key: impl Into<String>,
        write_attempts: u32,
    ) -> Self {
        let dataset = Dataset::new(objects.clone(), dataset_key, write_attempts);
        Self {
            objects,
            status,
            dataset,
            _extraction: PhantomData,
        }
    }

    pub fn dataset(&self) -> &Dataset<E::Record> {
        &self.dataset
    }

    #[instrument(skip(self, inputs), fields(stage = E::STAGE, inputs = inputs.len()))]
    pub async fn run(&self, inputs: &[InputRef]) -> Result<AggregationReport> {
        let mut report = AggregationReport {
            stage: E::STAGE,
            ..Default::default()
        };
        let mut merged_inputs: Vec<&InputRef> = Vec::new();
        let mut rows: Vec<E::Record> = Vec::new();

        for input in inputs {
            let file_name = input.file_name();

            if let Some(status) = self.status.get_status(file_name).await? {
                if status.get(E::FIELD) {
                    info!(input = file_name, "Already extracted, skipping");
                    report.skipped.push(file_name.to_string());
                    continue;
                }
            }

            let raw = self.objects.get(&input.key).await?.ok_or_else(|| {
                PipelineError::TransientIo(format!("Raw input {} not found in storage", input.key))
            })?;

            match parse_match(&raw.data, input.match_id, file_name) {
                Ok(parsed) => {
                    let extracted = E::rows(parsed);
                    info!(
                        input = file_name,
                        match_id = input.match_id,
                        rows = extracted.len(),
                        "Parsed match"
                    );
                    rows.extend(extracted);
                    merged_inputs.push(input);
                },
                Err(PipelineError::MalformedRecord { input: name, reason }) => {
                    error!(stage = E::STAGE, input = %name, %reason, "Malformed match document");
                    report.failed.push(FailedInput {
                        file_name: name,
                        reason,
                    });
                },
                Err(other) => return Err(other),
            }
        }

        if merged_inputs.is_empty() {
            warn!(stage = E::STAGE, "Nothing to merge");
            return Ok(report);
        }

        report.rows_merged = rows.len();
        let write = self.dataset.upsert_rows_with(rows, E::finalize).await?;
        report.dataset_rows = Some(write.total_rows);

        for input in merged_inputs {
            self.status
                .set_field(input.file_name(), input.match_id, E::FIELD, true)
                .await?;
            report.processed.push(input.file_name().to_string());
        }

        info!(stage = E::STAGE, summary = %report.summary(), "Aggregation finished");
        Ok(report)
    }

    /// Run over a normalized event; rejected entries are reported with the
    /// parse failures and never block the resolved inputs
    pub async fn run_batch(&self, batch: InputBatch) -> Result<AggregationReport> {
        for rejected in &batch.rejected {
            error!(
                stage = E::STAGE,
                input = %rejected.file_name,
                reason = %rejected.reason,
                "Event entry could not be resolved"
            );
        }
        let mut report = self.run(&batch.inputs).await?;
        report.failed.extend(batch.rejected);
        Ok(report)
    }
}
