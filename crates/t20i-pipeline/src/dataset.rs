//! Keyed CSV datasets
//!
//! A dataset is one CSV object holding every row produced so far. Writes are
//! read-merge-sort-write cycles: the current object is read together with
//! its version, new rows are upserted by natural key, the merged table is
//! encoded in memory and written back only if the object is still at the
//! version read. Losing that race re-runs the whole cycle.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use t20i_common::{DatasetRecord, PipelineError, Result};
use tracing::{debug, info, instrument, warn};

use crate::storage::{ObjectStore, PutCondition, PutOutcome};

/// Result of one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    /// Rows whose key was not present before
    pub inserted: usize,
    /// Rows that overwrote an existing row with the same key
    pub replaced: usize,
    /// Row count of the dataset after the write
    pub total_rows: usize,
    /// Write attempts used, including the successful one
    pub attempts: u32,
}

/// A typed view over one CSV object
pub struct Dataset<R> {
    store: Arc<dyn ObjectStore>,
    key: String,
    write_attempts: u32,
    _rows: PhantomData<fn() -> R>,
}

impl<R: DatasetRecord> Dataset<R> {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>, write_attempts: u32) -> Self {
        Self {
            store,
            key: key.into(),
            write_attempts: write_attempts.max(1),
            _rows: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Every row in stored order; empty when the object does not exist yet
    pub async fn read(&self) -> Result<Vec<R>> {
        match self.store.get(&self.key).await? {
            Some(object) => decode::<R>(&object.data, &self.key),
            None => Ok(Vec::new()),
        }
    }

    /// Every row, sorted by `order`
    pub async fn read_sorted<K, F>(&self, order: F) -> Result<Vec<R>>
    where
        K: Ord,
        F: Fn(&R) -> K,
    {
        let mut rows = self.read().await?;
        rows.sort_by_key(order);
        Ok(rows)
    }

    /// Upsert `rows` by natural key and persist the merged table sorted by key
    pub async fn upsert_rows(&self, rows: Vec<R>) -> Result<UpsertReport> {
        self.upsert_rows_with(rows, |_| {}).await
    }

    /// Upsert `rows`, then let `finalize` reorder or rewrite the merged table
    /// before it is encoded
    ///
    /// `finalize` runs on every attempt, so it must be a pure function of the
    /// merged rows.
    #[instrument(
        skip(self, rows, finalize),
        fields(dataset = R::DATASET, key = %self.key, rows = rows.len())
    )]
    pub async fn upsert_rows_with<F>(&self, rows: Vec<R>, finalize: F) -> Result<UpsertReport>
    where
        F: Fn(&mut Vec<R>),
    {
        for attempt in 1..=self.write_attempts {
            let current = self.store.get(&self.key).await?;

            let (existing, condition) = match current {
                Some(object) => (
                    decode::<R>(&object.data, &self.key)?,
                    PutCondition::IfMatch(object.version),
                ),
                None => (Vec::new(), PutCondition::IfAbsent),
            };

            let (mut merged, inserted, replaced) = merge(existing, rows.clone());
            finalize(&mut merged);
            let total_rows = merged.len();
            let body = encode(&merged)?;

            match self.store.put_if(&self.key, body, condition).await? {
                PutOutcome::Written => {
                    info!(
                        dataset = R::DATASET,
                        inserted, replaced, total_rows, attempt, "Dataset written"
                    );
                    return Ok(UpsertReport {
                        inserted,
                        replaced,
                        total_rows,
                        attempts: attempt,
                    });
                },
                PutOutcome::ConditionFailed => {
                    warn!(
                        dataset = R::DATASET,
                        attempt, "Dataset changed since it was read, merging again"
                    );
                },
            }
        }

        Err(PipelineError::ConcurrentModification {
            key: self.key.clone(),
            attempts: self.write_attempts,
        })
    }
}

/// Upsert `incoming` into `existing`; the result is ordered by key
fn merge<R: DatasetRecord>(existing: Vec<R>, incoming: Vec<R>) -> (Vec<R>, usize, usize) {
    let mut table: BTreeMap<R::Key, R> = existing.into_iter().map(|r| (r.key(), r)).collect();
    let mut inserted = 0;
    let mut replaced = 0;

    for row in incoming {
        match table.insert(row.key(), row) {
            Some(_) => replaced += 1,
            None => inserted += 1,
        }
    }

    (table.into_values().collect(), inserted, replaced)
}

/// Encode rows as CSV; the header row is written even when there are none
pub fn encode<R: DatasetRecord>(rows: &[R]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(R::COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| PipelineError::transient(format!("Failed to flush {} CSV: {}", R::DATASET, e)))
}

/// Decode a CSV object, checking its header against the record schema
pub fn decode<R: DatasetRecord>(data: &[u8], key: &str) -> Result<Vec<R>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    if !headers.iter().eq(R::COLUMNS.iter().copied()) {
        return Err(PipelineError::malformed(
            key,
            format!(
                "{} header does not match schema: {:?}",
                R::DATASET,
                headers.iter().collect::<Vec<_>>()
            ),
        ));
    }

    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<R>, csv::Error>>()?;
    debug!(dataset = R::DATASET, rows = rows.len(), "Decoded dataset");
    Ok(rows)
}
