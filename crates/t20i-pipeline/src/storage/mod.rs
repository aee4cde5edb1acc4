//! Object storage
//!
//! Keys are opaque strings partitioned by folder-like prefixes (raw inputs,
//! output datasets). Besides plain get/put/list the store supports
//! conditional writes against the version last read, which is how dataset
//! merges avoid lost updates between concurrent stage instances.

use async_trait::async_trait;
use std::collections::BTreeMap;
use t20i_common::Result;
use tokio::sync::Mutex;

pub mod config;
pub mod s3;

pub use s3::S3Storage;

/// Opaque object version (an ETag for S3)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectVersion(pub String);

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub version: ObjectVersion,
}

/// Precondition for a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    Always,
    /// Only create; fail if the key already exists
    IfAbsent,
    /// Only overwrite the exact version previously read
    IfMatch(ObjectVersion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    ConditionFailed,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object; `None` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<StoredObject>>;

    async fn put_if(&self, key: &str, data: Vec<u8>, condition: PutCondition)
        -> Result<PutOutcome>;

    /// All keys under `prefix`, across every listing page
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.put_if(key, data, PutCondition::Always).await?;
        Ok(())
    }
}

/// In-process object store for tests and local runs
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, (Vec<u8>, u64)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        let objects = self.objects.lock().await;
        Ok(objects.get(key).map(|(data, generation)| StoredObject {
            data: data.clone(),
            version: ObjectVersion(generation.to_string()),
        }))
    }

    async fn put_if(
        &self,
        key: &str,
        data: Vec<u8>,
        condition: PutCondition,
    ) -> Result<PutOutcome> {
        let mut objects = self.objects.lock().await;
        let current = objects.get(key).map(|(_, generation)| *generation);

        let allowed = match (&condition, current) {
            (PutCondition::Always, _) => true,
            (PutCondition::IfAbsent, existing) => existing.is_none(),
            (PutCondition::IfMatch(version), Some(generation)) => {
                version.0 == generation.to_string()
            },
            (PutCondition::IfMatch(_), None) => false,
        };

        if !allowed {
            return Ok(PutOutcome::ConditionFailed);
        }

        let next = current.map_or(1, |g| g + 1);
        objects.insert(key.to_string(), (data, next));
        Ok(PutOutcome::Written)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.lock().await;
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip_and_list() {
        let store = MemoryObjectStore::new();
        store.put("raw/1.json", b"{}".to_vec()).await.unwrap();
        store.put("raw/2.json", b"{}".to_vec()).await.unwrap();
        store.put("output/x.csv", b"a".to_vec()).await.unwrap();

        let got = store.get("raw/1.json").await.unwrap().unwrap();
        assert_eq!(got.data, b"{}");
        assert!(store.get("raw/3.json").await.unwrap().is_none());
        assert_eq!(store.list("raw/").await.unwrap(), vec!["raw/1.json", "raw/2.json"]);
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let store = MemoryObjectStore::new();

        let first = store
            .put_if("d.csv", b"v1".to_vec(), PutCondition::IfAbsent)
            .await
            .unwrap();
        assert_eq!(first, PutOutcome::Written);

        let again = store
            .put_if("d.csv", b"v1".to_vec(), PutCondition::IfAbsent)
            .await
            .unwrap();
        assert_eq!(again, PutOutcome::ConditionFailed);

        let read = store.get("d.csv").await.unwrap().unwrap();
        let stale = read.version.clone();
        let ok = store
            .put_if("d.csv", b"v2".to_vec(), PutCondition::IfMatch(read.version))
            .await
            .unwrap();
        assert_eq!(ok, PutOutcome::Written);

        let lost = store
            .put_if("d.csv", b"v3".to_vec(), PutCondition::IfMatch(stale))
            .await
            .unwrap();
        assert_eq!(lost, PutOutcome::ConditionFailed);
        assert_eq!(store.get("d.csv").await.unwrap().unwrap().data, b"v2");
    }
}
