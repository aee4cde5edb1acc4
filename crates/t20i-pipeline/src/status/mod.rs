//! Processing-status store
//!
//! The status store is the source of truth for "already processed": one
//! entry per raw input, with one completion flag per aggregator.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use t20i_common::{MatchId, ProcessingStatus, Result, StatusField};
use tokio::sync::Mutex;

pub mod postgres;

pub use postgres::PostgresStatusStore;

/// One page of a keyset scan
#[derive(Debug, Clone, Default)]
pub struct StatusPage {
    pub entries: Vec<ProcessingStatus>,
    /// Cursor for the next page; `None` once the scan is complete
    pub next: Option<String>,
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn get_status(&self, file_name: &str) -> Result<Option<ProcessingStatus>>;

    /// Create an entry with both flags false. Returns `false` when the entry
    /// already existed; existing flags are never reset.
    async fn register(&self, file_name: &str, match_id: MatchId) -> Result<bool>;

    /// Update a single flag, creating the entry if it does not exist
    async fn set_field(
        &self,
        file_name: &str,
        match_id: MatchId,
        field: StatusField,
        value: bool,
    ) -> Result<()>;

    /// Entries ordered by file name, strictly after `after`
    async fn scan_page(&self, after: Option<&str>, limit: usize) -> Result<StatusPage>;
}

/// Read every entry, following cursors until the store is exhausted
pub async fn scan_all(store: &dyn StatusStore, page_size: usize) -> Result<Vec<ProcessingStatus>> {
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = store.scan_page(cursor.as_deref(), page_size.max(1)).await?;
        all.extend(page.entries);
        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    tracing::debug!(entries = all.len(), "Scanned status store");
    Ok(all)
}

/// In-process status store for tests and local runs
#[derive(Default)]
pub struct MemoryStatusStore {
    entries: Mutex<BTreeMap<String, ProcessingStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get_status(&self, file_name: &str) -> Result<Option<ProcessingStatus>> {
        Ok(self.entries.lock().await.get(file_name).cloned())
    }

    async fn register(&self, file_name: &str, match_id: MatchId) -> Result<bool> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(file_name) {
            return Ok(false);
        }
        entries.insert(file_name.to_string(), ProcessingStatus::new(file_name, match_id));
        Ok(true)
    }

    async fn set_field(
        &self,
        file_name: &str,
        match_id: MatchId,
        field: StatusField,
        value: bool,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(file_name.to_string())
            .or_insert_with(|| ProcessingStatus::new(file_name, match_id))
            .set(field, value);
        Ok(())
    }

    async fn scan_page(&self, after: Option<&str>, limit: usize) -> Result<StatusPage> {
        let entries = self.entries.lock().await;
        let lower = match after {
            Some(cursor) => Bound::Excluded(cursor.to_string()),
            None => Bound::Unbounded,
        };

        let page: Vec<ProcessingStatus> = entries
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, status)| status.clone())
            .collect();

        let next = match page.last() {
            Some(last) if page.len() == limit => Some(last.file_name.clone()),
            _ => None,
        };

        Ok(StatusPage {
            entries: page,
            next,
        })
    }
}
