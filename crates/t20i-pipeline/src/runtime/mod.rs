//! Stage runtime
//!
//! Wires configuration to concrete collaborators ([`Services`]) and provides
//! the stage bodies that the invocation wrapper runs.

use serde_json::Value;
use std::sync::Arc;
use t20i_common::{PipelineError, Result};
use tracing::{info, warn};

use crate::aggregate::{Aggregator, DeliverywiseExtraction, Extraction, MatchwiseExtraction};
use crate::alerts::{AlertChannel, LogOnlyAlerts, TelegramAlerts};
use crate::bus::{MemoryBus, MessageBus, PostgresBus, DELIVERYWISE_GROUP, MATCHWISE_GROUP};
use crate::config::{
    deliverywise_dataset_key, matchwise_dataset_key, Backend, PipelineConfig, TelegramConfig,
    NEW_MATCH_FILES_TOPIC,
};
use crate::db::{create_pool, run_migrations, DbConfig};
use crate::host::DatasetHost;
use crate::stages::{replay, ExportStage, IngestionSettings, IngestionStage};
use crate::status::{MemoryStatusStore, PostgresStatusStore, StatusStore};
use crate::storage::{ObjectStore, S3Storage};

pub mod consumer;
pub mod event;
pub mod invocation;

pub use consumer::{ConsumeReport, FailedMessage, QueueConsumer};
pub use event::{is_timer_event, normalizer_for, EventNormalizer};
pub use invocation::{invoke, InvocationResponse};

/// Alert channel from the environment; falls back to logging so that an
/// alerting problem never stops a stage
pub fn alerts_from_env() -> Arc<dyn AlertChannel> {
    let Some(config) = TelegramConfig::from_env() else {
        return Arc::new(LogOnlyAlerts);
    };
    match TelegramAlerts::new(config) {
        Ok(alerts) => Arc::new(alerts),
        Err(err) => {
            warn!(error = %err, "Telegram alerts unavailable, logging alerts instead");
            Arc::new(LogOnlyAlerts)
        },
    }
}

/// Collaborators shared by every stage
pub struct Services {
    pub config: PipelineConfig,
    pub objects: Arc<dyn ObjectStore>,
    pub status: Arc<dyn StatusStore>,
    pub bus: Arc<dyn MessageBus>,
}

impl Services {
    /// Connect to object storage and the configured status/queue backend
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let objects: Arc<dyn ObjectStore> = Arc::new(S3Storage::new(config.storage.clone()).await);

        let (status, bus): (Arc<dyn StatusStore>, Arc<dyn MessageBus>) = match config.backend {
            Backend::Postgres => {
                let pool = create_pool(&DbConfig::new(config.require_database_url()?)).await?;
                (
                    Arc::new(PostgresStatusStore::new(pool.clone())),
                    Arc::new(PostgresBus::new(pool, config.queue_max_attempts)),
                )
            },
            Backend::Memory => (
                Arc::new(MemoryStatusStore::new()),
                Arc::new(MemoryBus::new(config.queue_max_attempts)),
            ),
        };

        let services = Self::from_parts(config, objects, status, bus);
        services.subscribe_aggregators().await?;
        Ok(services)
    }

    pub fn from_parts(
        config: PipelineConfig,
        objects: Arc<dyn ObjectStore>,
        status: Arc<dyn StatusStore>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            config,
            objects,
            status,
            bus,
        }
    }

    /// Both aggregators receive every new-match announcement
    pub async fn subscribe_aggregators(&self) -> Result<()> {
        self.bus.subscribe(NEW_MATCH_FILES_TOPIC, DELIVERYWISE_GROUP).await?;
        self.bus.subscribe(NEW_MATCH_FILES_TOPIC, MATCHWISE_GROUP).await
    }

    pub fn deliverywise(&self) -> Aggregator<DeliverywiseExtraction> {
        Aggregator::new(
            self.objects.clone(),
            self.status.clone(),
            deliverywise_dataset_key(),
            self.config.dataset_write_attempts,
        )
    }

    pub fn matchwise(&self) -> Aggregator<MatchwiseExtraction> {
        Aggregator::new(
            self.objects.clone(),
            self.status.clone(),
            matchwise_dataset_key(),
            self.config.dataset_write_attempts,
        )
    }

    pub fn ingestion(&self) -> Result<IngestionStage> {
        IngestionStage::new(
            self.objects.clone(),
            self.status.clone(),
            self.bus.clone(),
            IngestionSettings::from_config(&self.config, NEW_MATCH_FILES_TOPIC),
        )
    }

    pub fn consumer<E: Extraction>(
        &self,
        aggregator: Aggregator<E>,
        group: &str,
    ) -> QueueConsumer<E> {
        QueueConsumer::new(self.bus.clone(), aggregator, NEW_MATCH_FILES_TOPIC, group)
    }
}

// ============================================================================
// Stage bodies
// ============================================================================

pub async fn ingest(services: &Services) -> Result<String> {
    Ok(services.ingestion()?.run().await?.summary())
}

/// Aggregator entry point for a storage notification or bus delivery
pub async fn aggregate<E: Extraction>(
    services: &Services,
    aggregator: &Aggregator<E>,
    event: &Value,
) -> Result<String> {
    if is_timer_event(event) {
        return Err(PipelineError::malformed(
            "trigger event",
            format!("{} extraction needs a storage or bus event", E::STAGE),
        ));
    }

    let batch = normalizer_for(services.config.trigger).normalize(event)?;
    aggregator.run_batch(batch).await?.into_result()
}

pub async fn consume<E: Extraction>(
    services: &Services,
    aggregator: Aggregator<E>,
    group: &str,
    max_messages: Option<usize>,
) -> Result<String> {
    let report = services.consumer(aggregator, group).drain(max_messages).await?;
    report.into_result(group)
}

pub async fn export(
    services: &Services,
    host: Arc<dyn DatasetHost>,
    dataset_id: &str,
) -> Result<String> {
    let report = ExportStage::new(services.objects.clone(), host, dataset_id)
        .run()
        .await?;
    Ok(format!(
        "Exported {} matches and {} deliveries: {}",
        report.matches, report.deliveries, report.version_note
    ))
}

pub async fn replay_incomplete(services: &Services) -> Result<String> {
    let report = replay(
        services.status.as_ref(),
        services.bus.as_ref(),
        NEW_MATCH_FILES_TOPIC,
        services.config.status_scan_page_size,
    )
    .await?;
    Ok(report.summary())
}

/// Apply migrations; a no-op for the in-memory backend
pub async fn migrate(config: &PipelineConfig) -> Result<String> {
    match config.backend {
        Backend::Postgres => {
            let pool = create_pool(&DbConfig::new(config.require_database_url()?)).await?;
            run_migrations(&pool).await?;
            Ok("Migrations applied".to_string())
        },
        Backend::Memory => {
            info!("In-memory backend selected, nothing to migrate");
            Ok("Nothing to migrate for the in-memory backend".to_string())
        },
    }
}
