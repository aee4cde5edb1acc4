//! Ingestion stage
//!
//! Downloads the source archive, finds the match documents that have never
//! been seen, stores them as raw inputs and announces each one on the bus.
//! For every new file the order is: store, publish, mark announced, register
//! status. Both detection strategies look at records written after the
//! publish (the status entry, or the announced marker), so a failure before
//! or during publishing leaves the file new for the next run. A crash after
//! publishing re-announces it; consumers tolerate the duplicate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use t20i_common::records::match_id_from_key;
use t20i_common::{MatchId, PipelineError, Result};
use tracing::{info, instrument, warn};

use crate::archive::extract_json_entries;
use crate::bus::{publish_new_match, MessageBus, NewMatchFile};
use crate::config::{
    announced_marker_key, announced_marker_prefix, raw_input_key, DetectionStrategy, PipelineConfig,
};
use crate::detector::{detect_new, SeenSource};
use crate::status::StatusStore;
use crate::storage::ObjectStore;

#[derive(Debug, Clone)]
pub struct IngestionSettings {
    pub archive_url: String,
    pub detection: DetectionStrategy,
    pub max_new_files: Option<usize>,
    pub status_page_size: usize,
    pub topic: String,
}

impl IngestionSettings {
    pub fn from_config(config: &PipelineConfig, topic: impl Into<String>) -> Self {
        Self {
            archive_url: config.cricsheet_url.clone(),
            detection: config.detection,
            max_new_files: config.max_new_files_per_run,
            status_page_size: config.status_scan_page_size,
            topic: topic.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub archive_entries: usize,
    /// New files stored and announced, in match-ID order
    pub announced: Vec<String>,
    /// New files left for a later run by the per-run cap
    pub deferred: usize,
    /// Archive entries whose name is not `<match id>.json`
    pub ignored: usize,
}

impl IngestionReport {
    pub fn summary(&self) -> String {
        if self.announced.is_empty() {
            return format!("No new files among {} archive entries", self.archive_entries);
        }
        format!(
            "Announced {} new files ({} deferred): {}",
            self.announced.len(),
            self.deferred,
            self.announced.join(", ")
        )
    }
}

pub struct IngestionStage {
    http: reqwest::Client,
    objects: Arc<dyn ObjectStore>,
    status: Arc<dyn StatusStore>,
    bus: Arc<dyn MessageBus>,
    settings: IngestionSettings,
}

impl IngestionStage {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusStore>,
        bus: Arc<dyn MessageBus>,
        settings: IngestionSettings,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                PipelineError::ConfigurationMissing(format!("HTTP client for ingestion: {}", e))
            })?;

        Ok(Self {
            http,
            objects,
            status,
            bus,
            settings,
        })
    }

    #[instrument(skip(self), fields(url = %self.settings.archive_url))]
    pub async fn run(&self) -> Result<IngestionReport> {
        let archive = self.download().await?;
        let entries = extract_json_entries(&archive)?;
        self.ingest_entries(entries).await
    }

    /// Everything after the download; split out so archives from other
    /// sources (or tests) go through the same path
    pub async fn ingest_entries(
        &self,
        mut entries: BTreeMap<String, Vec<u8>>,
    ) -> Result<IngestionReport> {
        let mut report = IngestionReport {
            archive_entries: entries.len(),
            ..Default::default()
        };

        let mut ids: BTreeMap<String, MatchId> = BTreeMap::new();
        for name in entries.keys() {
            match match_id_from_key(name) {
                Some(id) => {
                    ids.insert(name.clone(), id);
                },
                None => {
                    warn!(file = %name, "Ignoring archive entry without a numeric match ID");
                    report.ignored += 1;
                },
            }
        }

        let candidates: BTreeSet<String> = ids.keys().cloned().collect();
        let source = match self.settings.detection {
            DetectionStrategy::Status => SeenSource::Status {
                store: self.status.as_ref(),
                page_size: self.settings.status_page_size,
            },
            DetectionStrategy::Listing => SeenSource::Listing {
                objects: self.objects.as_ref(),
                prefix: announced_marker_prefix(),
            },
        };
        let new_files = detect_new(&candidates, source).await?;

        let mut ordered: Vec<(MatchId, String)> = new_files
            .into_iter()
            .filter_map(|name| ids.get(&name).map(|id| (*id, name)))
            .collect();
        ordered.sort();

        if let Some(cap) = self.settings.max_new_files {
            if ordered.len() > cap {
                report.deferred = ordered.len() - cap;
                ordered.truncate(cap);
                info!(cap, deferred = report.deferred, "Per-run cap reached");
            }
        }

        for (match_id, name) in ordered {
            let body = entries.remove(&name).unwrap_or_default();
            let key = raw_input_key(&name);

            self.objects.put(&key, body).await?;
            let message = NewMatchFile {
                json_file_key: key.clone(),
                match_id,
            };
            publish_new_match(self.bus.as_ref(), &self.settings.topic, &message).await?;
            self.objects.put(&announced_marker_key(&name), Vec::new()).await?;
            self.status.register(&name, match_id).await?;

            info!(input = %name, match_id, "New match file announced");
            report.announced.push(name);
        }

        Ok(report)
    }

    async fn download(&self) -> Result<Vec<u8>> {
        let url = &self.settings.archive_url;
        info!(%url, "Downloading source archive");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::TransientIo(format!("Failed to download {}: {}", url, e)))?;

        let bytes = response.bytes().await.map_err(|e| {
            PipelineError::TransientIo(format!("Failed to read archive body: {}", e))
        })?;

        info!(bytes = bytes.len(), "Archive downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::archive::build_zip;
    use crate::bus::{Delivery, MemoryBus, NackOutcome, DELIVERYWISE_GROUP};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;
    use crate::config::NEW_MATCH_FILES_TOPIC;
    use crate::status::MemoryStatusStore;
    use crate::storage::MemoryObjectStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        objects: Arc<MemoryObjectStore>,
        status: Arc<MemoryStatusStore>,
        bus: Arc<MemoryBus>,
    }

    async fn harness() -> Harness {
        let bus = Arc::new(MemoryBus::new(3));
        bus.subscribe(NEW_MATCH_FILES_TOPIC, DELIVERYWISE_GROUP).await.unwrap();
        Harness {
            objects: Arc::new(MemoryObjectStore::new()),
            status: Arc::new(MemoryStatusStore::new()),
            bus,
        }
    }

    fn stage(
        h: &Harness,
        url: String,
        detection: DetectionStrategy,
        cap: Option<usize>,
    ) -> IngestionStage {
        IngestionStage::new(
            h.objects.clone(),
            h.status.clone(),
            h.bus.clone(),
            IngestionSettings {
                archive_url: url,
                detection,
                max_new_files: cap,
                status_page_size: 2,
                topic: NEW_MATCH_FILES_TOPIC.to_string(),
            },
        )
        .unwrap()
    }

    fn entries(names: &[&str]) -> BTreeMap<String, Vec<u8>> {
        names.iter().map(|n| (n.to_string(), b"{}".to_vec())).collect()
    }

    #[tokio::test]
    async fn test_downloads_and_announces_new_files() {
        let server = MockServer::start().await;
        let archive = build_zip(&[("README.txt", b"x"), ("20.json", b"{}"), ("3.json", b"{}")]);
        Mock::given(method("GET"))
            .and(path("/t20s_male_json.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
            .mount(&server)
            .await;

        let h = harness().await;
        let url = format!("{}/t20s_male_json.zip", server.uri());
        let report = stage(&h, url, DetectionStrategy::Status, None).run().await.unwrap();

        assert_eq!(report.archive_entries, 2);
        assert_eq!(report.announced, vec!["3.json", "20.json"]);
        assert!(h.objects.get(&raw_input_key("20.json")).await.unwrap().is_some());
        assert!(h.status.get_status("3.json").await.unwrap().is_some());

        let first = h.bus.claim(NEW_MATCH_FILES_TOPIC, DELIVERYWISE_GROUP).await.unwrap().unwrap();
        assert_eq!(first.payload["match_id"], 3);
    }

    #[tokio::test]
    async fn test_download_failure_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let h = harness().await;
        let err = stage(&h, server.uri(), DetectionStrategy::Status, None)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TransientIo(_)));
        assert!(h.objects.is_empty().await);
    }

    #[tokio::test]
    async fn test_second_run_announces_nothing() {
        let h = harness().await;
        let ingest = stage(&h, String::new(), DetectionStrategy::Status, None);

        let first = ingest.ingest_entries(entries(&["1.json", "2.json", "3.json"])).await.unwrap();
        assert_eq!(first.announced.len(), 3);

        let second = ingest
            .ingest_entries(entries(&["1.json", "2.json", "3.json", "4.json"]))
            .await
            .unwrap();
        assert_eq!(second.announced, vec!["4.json"]);
    }

    #[tokio::test]
    async fn test_cap_defers_highest_ids() {
        let h = harness().await;
        let ingest = stage(&h, String::new(), DetectionStrategy::Status, Some(2));

        let report = ingest.ingest_entries(entries(&["9.json", "7.json", "8.json"])).await.unwrap();
        assert_eq!(report.announced, vec!["7.json", "8.json"]);
        assert_eq!(report.deferred, 1);

        let next = ingest.ingest_entries(entries(&["9.json", "7.json", "8.json"])).await.unwrap();
        assert_eq!(next.announced, vec!["9.json"]);
    }

    #[tokio::test]
    async fn test_listing_strategy_uses_announced_markers() {
        let h = harness().await;
        h.objects.put(&announced_marker_key("1.json"), Vec::new()).await.unwrap();
        // Stored but never announced
        h.objects.put(&raw_input_key("2.json"), b"{}".to_vec()).await.unwrap();

        let ingest = stage(&h, String::new(), DetectionStrategy::Listing, None);
        let report = ingest.ingest_entries(entries(&["1.json", "2.json"])).await.unwrap();
        assert_eq!(report.announced, vec!["2.json"]);
        assert!(h.objects.get(&announced_marker_key("2.json")).await.unwrap().is_some());

        let again = ingest.ingest_entries(entries(&["1.json", "2.json"])).await.unwrap();
        assert!(again.announced.is_empty());
    }

    /// Fails the first `failures` publishes, then delegates
    struct FlakyBus {
        inner: MemoryBus,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl MessageBus for FlakyBus {
        async fn subscribe(&self, topic: &str, consumer_group: &str) -> Result<()> {
            self.inner.subscribe(topic, consumer_group).await
        }

        async fn publish(&self, topic: &str, payload: &Value) -> Result<usize> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(PipelineError::TransientIo("bus unavailable".to_string()));
            }
            self.inner.publish(topic, payload).await
        }

        async fn claim(&self, topic: &str, consumer_group: &str) -> Result<Option<Delivery>> {
            self.inner.claim(topic, consumer_group).await
        }

        async fn ack(&self, id: Uuid) -> Result<()> {
            self.inner.ack(id).await
        }

        async fn nack(&self, id: Uuid, error: &str, retry: bool) -> Result<NackOutcome> {
            self.inner.nack(id, error, retry).await
        }

        async fn dead_letters(&self, topic: &str) -> Result<Vec<Delivery>> {
            self.inner.dead_letters(topic).await
        }

        async fn requeue_dead_letters(&self, topic: &str) -> Result<usize> {
            self.inner.requeue_dead_letters(topic).await
        }
    }

    #[tokio::test]
    async fn test_failed_publish_is_retried_by_next_run() {
        for detection in [DetectionStrategy::Listing, DetectionStrategy::Status] {
            let objects = Arc::new(MemoryObjectStore::new());
            let status = Arc::new(MemoryStatusStore::new());
            let bus = Arc::new(FlakyBus {
                inner: MemoryBus::new(3),
                failures: AtomicUsize::new(1),
            });
            bus.subscribe(NEW_MATCH_FILES_TOPIC, DELIVERYWISE_GROUP).await.unwrap();

            let ingest = IngestionStage::new(
                objects.clone(),
                status.clone(),
                bus.clone(),
                IngestionSettings {
                    archive_url: String::new(),
                    detection,
                    max_new_files: None,
                    status_page_size: 2,
                    topic: NEW_MATCH_FILES_TOPIC.to_string(),
                },
            )
            .unwrap();

            let err = ingest.ingest_entries(entries(&["1.json"])).await.unwrap_err();
            assert!(err.is_retryable(), "{:?}", detection);
            // Stored, but neither marked nor registered
            assert!(objects.get(&raw_input_key("1.json")).await.unwrap().is_some());
            assert!(objects.get(&announced_marker_key("1.json")).await.unwrap().is_none());
            assert!(status.get_status("1.json").await.unwrap().is_none());

            let retry = ingest.ingest_entries(entries(&["1.json"])).await.unwrap();
            assert_eq!(retry.announced, vec!["1.json"], "{:?}", detection);

            let delivery = bus.claim(NEW_MATCH_FILES_TOPIC, DELIVERYWISE_GROUP).await.unwrap();
            assert_eq!(delivery.unwrap().payload["match_id"], 1);
        }
    }
}
