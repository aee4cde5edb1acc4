use t20i_common::{DeliveryRecord, StatusField};

use super::Extraction;
use crate::cricsheet::ParsedMatch;

/// Ball-by-ball dataset, kept sorted by the composite delivery key
pub struct DeliverywiseExtraction;

impl Extraction for DeliverywiseExtraction {
    type Record = DeliveryRecord;

    const STAGE: &'static str = "deliverywise";
    const FIELD: StatusField = StatusField::Deliverywise;

    fn rows(parsed: ParsedMatch) -> Vec<DeliveryRecord> {
        parsed.deliveries
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::aggregate::{Aggregator, FailedInput, InputBatch, InputRef};
    use crate::config::{deliverywise_dataset_key, raw_input_key};
    use crate::status::{MemoryStatusStore, StatusStore};
    use crate::storage::{MemoryObjectStore, ObjectStore};
    use crate::test_support::match_bytes;
    use std::sync::Arc;
    use t20i_common::{DatasetRecord, PipelineError};

    struct Fixture {
        objects: Arc<MemoryObjectStore>,
        status: Arc<MemoryStatusStore>,
        aggregator: Aggregator<DeliverywiseExtraction>,
    }

    fn fixture() -> Fixture {
        let objects = Arc::new(MemoryObjectStore::new());
        let status = Arc::new(MemoryStatusStore::new());
        let aggregator =
            Aggregator::new(objects.clone(), status.clone(), deliverywise_dataset_key(), 3);
        Fixture {
            objects,
            status,
            aggregator,
        }
    }

    async fn stage_input(fx: &Fixture, match_id: u64, body: Vec<u8>) -> InputRef {
        let key = raw_input_key(&format!("{}.json", match_id));
        fx.objects.put(&key, body).await.unwrap();
        InputRef::new(key, match_id)
    }

    #[tokio::test]
    async fn test_first_run_creates_dataset_and_marks_status() {
        let fx = fixture();
        let bytes = match_bytes("2024-02-01", "Nepal", "Namibia", 2400);
        let input = stage_input(&fx, 100, bytes).await;

        let report = fx.aggregator.run(&[input]).await.unwrap();
        assert_eq!(report.processed, vec!["100.json"]);
        assert_eq!(report.dataset_rows, Some(12));

        let rows = fx.aggregator.dataset().read().await.unwrap();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows.iter().filter(|r| r.is_wicket()).count(), 1);

        let status = fx.status.get_status("100.json").await.unwrap().unwrap();
        assert!(status.delivery_done);
        assert!(!status.match_done);
    }

    #[tokio::test]
    async fn test_redelivery_does_not_duplicate_rows() {
        let fx = fixture();
        let bytes = match_bytes("2024-02-01", "Nepal", "Namibia", 2400);
        let input = stage_input(&fx, 100, bytes).await;

        fx.aggregator.run(&[input.clone()]).await.unwrap();
        let again = fx.aggregator.run(&[input.clone()]).await.unwrap();
        assert_eq!(again.skipped, vec!["100.json"]);
        assert_eq!(again.dataset_rows, None);

        // Even with the status flag lost, the keyed merge suppresses duplicates
        fx.status
            .set_field("100.json", 100, StatusField::Deliverywise, false)
            .await
            .unwrap();
        let replayed = fx.aggregator.run(&[input]).await.unwrap();
        assert_eq!(replayed.dataset_rows, Some(12));
    }

    #[tokio::test]
    async fn test_malformed_input_does_not_block_siblings() {
        let fx = fixture();
        let good = stage_input(&fx, 200, match_bytes("2024-03-01", "Oman", "Scotland", 2500)).await;
        let bad = stage_input(&fx, 201, br#"{"info": {"teams": ["Oman"]}}"#.to_vec()).await;

        let report = fx.aggregator.run(&[bad, good]).await.unwrap();
        assert_eq!(report.processed, vec!["200.json"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file_name, "201.json");

        assert!(fx.status.get_status("201.json").await.unwrap().is_none());
        assert_eq!(fx.aggregator.dataset().read().await.unwrap().len(), 12);

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { .. }));
    }

    #[tokio::test]
    async fn test_rejected_event_entry_is_reported_beside_merged_inputs() {
        let fx = fixture();
        let good = stage_input(&fx, 210, match_bytes("2024-03-02", "Oman", "Nepal", 2501)).await;
        let batch = InputBatch {
            inputs: vec![good],
            rejected: vec![FailedInput {
                file_name: "211.json".to_string(),
                reason: "match_id is not an integer".to_string(),
            }],
        };

        let report = fx.aggregator.run_batch(batch).await.unwrap();
        assert_eq!(report.processed, vec!["210.json"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].file_name, "211.json");
        assert_eq!(fx.aggregator.dataset().read().await.unwrap().len(), 12);

        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("211.json"));
    }

    #[tokio::test]
    async fn test_missing_raw_input_aborts_without_marking() {
        let fx = fixture();
        let present = stage_input(&fx, 300, match_bytes("2024-04-01", "UAE", "Kenya", 2600)).await;
        let missing = InputRef::new(raw_input_key("301.json"), 301);

        let err = fx.aggregator.run(&[present, missing]).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(fx.status.get_status("300.json").await.unwrap().is_none());
        assert!(fx.objects.get(&deliverywise_dataset_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sequential_runs_union_sorted() {
        let fx = fixture();
        let later = stage_input(&fx, 900, match_bytes("2024-05-02", "Italy", "Jersey", 2700)).await;
        let earlier = stage_input(&fx, 50, match_bytes("2024-05-01", "Canada", "USA", 2699)).await;

        fx.aggregator.run(&[later]).await.unwrap();
        fx.aggregator.run(&[earlier]).await.unwrap();

        let rows = fx.aggregator.dataset().read().await.unwrap();
        assert_eq!(rows.len(), 24);
        let keys: Vec<_> = rows.iter().map(|r| r.key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(rows[0].match_id, 50);
    }
}
