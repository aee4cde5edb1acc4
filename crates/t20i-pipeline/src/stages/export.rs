//! Dataset export stage
//!
//! Reads both datasets, orders them by match chronology and hands a staging
//! folder to the dataset host. The version note names the most recent match.

use std::collections::HashMap;
use std::sync::Arc;
use t20i_common::{DeliveryRecord, MatchId, MatchSummaryRecord, PipelineError, Result};
use tracing::{info, instrument};

use crate::config::{
    deliverywise_dataset_key, matchwise_dataset_key, DELIVERYWISE_CSV_FILE_NAME,
    MATCHWISE_CSV_FILE_NAME,
};
use crate::dataset::{encode, Dataset};
use crate::host::{DatasetHost, DATASET_METADATA_FILE};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub matches: usize,
    pub deliveries: usize,
    pub version_note: String,
}

pub struct ExportStage {
    matches: Dataset<MatchSummaryRecord>,
    deliveries: Dataset<DeliveryRecord>,
    host: Arc<dyn DatasetHost>,
    dataset_id: String,
}

impl ExportStage {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        host: Arc<dyn DatasetHost>,
        dataset_id: impl Into<String>,
    ) -> Self {
        Self {
            matches: Dataset::new(objects.clone(), matchwise_dataset_key(), 1),
            deliveries: Dataset::new(objects, deliverywise_dataset_key(), 1),
            host,
            dataset_id: dataset_id.into(),
        }
    }

    #[instrument(skip(self), fields(dataset = %self.dataset_id))]
    pub async fn run(&self) -> Result<ExportReport> {
        let matches = self.matches.read_sorted(MatchSummaryRecord::chronology).await?;
        let last = matches.last().ok_or_else(|| {
            PipelineError::EmptyDataset(format!("{} has no rows", self.matches.key()))
        })?;
        let version_note = version_note(last);

        let mut deliveries = self.deliveries.read().await?;
        sort_by_chronology(&mut deliveries, &matches);

        let staging = tempfile::tempdir()?;
        let folder = staging.path();
        tokio::fs::write(folder.join(MATCHWISE_CSV_FILE_NAME), encode(&matches)?).await?;
        tokio::fs::write(folder.join(DELIVERYWISE_CSV_FILE_NAME), encode(&deliveries)?).await?;
        let metadata = serde_json::json!({ "id": self.dataset_id });
        tokio::fs::write(
            folder.join(DATASET_METADATA_FILE),
            serde_json::to_vec(&metadata)?,
        )
        .await?;

        self.host.publish_version(folder, &version_note).await?;

        info!(
            matches = matches.len(),
            deliveries = deliveries.len(),
            note = %version_note,
            "Dataset exported"
        );

        Ok(ExportReport {
            matches: matches.len(),
            deliveries: deliveries.len(),
            version_note,
        })
    }
}

pub fn version_note(last: &MatchSummaryRecord) -> String {
    format!(
        "Dataset updated till the match between {} and {} on {}",
        last.team_1, last.team_2, last.date
    )
}

/// Order deliveries by their match's position in `matches`, then innings,
/// over and ball. Deliveries of matches missing from `matches` go last,
/// ordered by match ID.
pub fn sort_by_chronology(deliveries: &mut [DeliveryRecord], matches: &[MatchSummaryRecord]) {
    let position: HashMap<MatchId, usize> = matches
        .iter()
        .enumerate()
        .map(|(index, m)| (m.match_id, index))
        .collect();

    deliveries.sort_by_key(|d| {
        let rank = match position.get(&d.match_id) {
            Some(index) => (0u8, *index as u64),
            None => (1u8, d.match_id),
        };
        (rank, d.innings_number, d.over_number, d.ball_number)
    });
}
