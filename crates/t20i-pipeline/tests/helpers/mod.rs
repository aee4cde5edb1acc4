//! Test helpers for pipeline integration tests
//!
//! This module provides utilities for:
//! - Tracing setup that plays well with the test harness
//! - In-memory service wiring for end-to-end runs
//! - Match document and archive builders (see [`fixtures`])

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use t20i_pipeline::bus::{MemoryBus, MessageBus};
use t20i_pipeline::config::{
    Backend, DetectionStrategy, EventTrigger, PipelineConfig, DEFAULT_CRICSHEET_URL,
};
use t20i_pipeline::runtime::Services;
use t20i_pipeline::status::{MemoryStatusStore, StatusStore};
use t20i_pipeline::storage::config::StorageConfig;
use t20i_pipeline::storage::{MemoryObjectStore, ObjectStore};

pub use fixtures::*;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,t20i_pipeline=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Configuration for the in-memory backend with no alerting
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        storage: StorageConfig::for_aws("us-east-1", "t20i-test"),
        backend: Backend::Memory,
        database_url: None,
        cricsheet_url: DEFAULT_CRICSHEET_URL.to_string(),
        detection: DetectionStrategy::Status,
        trigger: EventTrigger::Bus,
        max_new_files_per_run: None,
        queue_max_attempts: 3,
        status_scan_page_size: 2,
        dataset_write_attempts: 5,
        telegram: None,
    }
}

/// Services backed entirely by in-process stores
pub struct MemoryServices {
    pub services: Services,
    pub objects: Arc<MemoryObjectStore>,
    pub status: Arc<MemoryStatusStore>,
    pub bus: Arc<MemoryBus>,
}

impl MemoryServices {
    pub async fn new(config: PipelineConfig) -> Self {
        let objects = Arc::new(MemoryObjectStore::new());
        let status = Arc::new(MemoryStatusStore::new());
        let bus = Arc::new(MemoryBus::new(config.queue_max_attempts));

        let services = Services::from_parts(
            config,
            objects.clone() as Arc<dyn ObjectStore>,
            status.clone() as Arc<dyn StatusStore>,
            bus.clone() as Arc<dyn MessageBus>,
        );
        services
            .subscribe_aggregators()
            .await
            .expect("Failed to subscribe aggregators");

        Self {
            services,
            objects,
            status,
            bus,
        }
    }
}
