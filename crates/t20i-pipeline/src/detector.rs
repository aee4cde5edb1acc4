//! New-item detection
//!
//! Given the file names found in a freshly unpacked archive, decide which
//! ones have never been seen. Detection is read-only.

use std::collections::BTreeSet;
use t20i_common::Result;
use tracing::{debug, info};

use crate::status::{scan_all, StatusStore};
use crate::storage::ObjectStore;

/// Where the "already seen" set comes from
pub enum SeenSource<'a> {
    /// Processing-status entries (authoritative)
    Status {
        store: &'a dyn StatusStore,
        page_size: usize,
    },
    /// Raw inputs already uploaded under a storage prefix
    Listing {
        objects: &'a dyn ObjectStore,
        prefix: String,
    },
}

/// `candidates` minus everything already seen
///
/// The whole seen set is loaded (every status page, every listing page)
/// before any candidate is reported as new.
pub async fn detect_new(
    candidates: &BTreeSet<String>,
    source: SeenSource<'_>,
) -> Result<BTreeSet<String>> {
    if candidates.is_empty() {
        return Ok(BTreeSet::new());
    }

    let seen: BTreeSet<String> = match source {
        SeenSource::Status { store, page_size } => scan_all(store, page_size)
            .await?
            .into_iter()
            .map(|status| status.file_name)
            .collect(),
        SeenSource::Listing { objects, prefix } => objects
            .list(&prefix)
            .await?
            .into_iter()
            .filter_map(|key| key.rsplit('/').next().map(str::to_string))
            .collect(),
    };
    debug!(seen = seen.len(), "Loaded already-seen inputs");

    let new = difference(candidates, &seen);
    info!(candidates = candidates.len(), new = new.len(), "New-item detection finished");
    Ok(new)
}

/// Pure set difference
pub fn difference(candidates: &BTreeSet<String>, seen: &BTreeSet<String>) -> BTreeSet<String> {
    candidates.difference(seen).cloned().collect()
}
