use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use t20i_common::{PipelineError, Result};
use tracing::{debug, info, instrument};

use super::config::StorageConfig;
use super::{ObjectStore, ObjectVersion, PutCondition, PutOutcome, StoredObject};

/// S3-backed object store for one bucket
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> Self {
        debug!("Initializing storage with config: {:?}", config);

        let mut builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "t20i-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Self {
            client,
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn content_type_for(key: &str) -> &'static str {
    if key.ends_with(".json") {
        "application/json"
    } else if key.ends_with(".csv") {
        "text/csv"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<StoredObject>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    debug!("s3://{}/{} does not exist", self.bucket, key);
                    return Ok(None);
                }
                return Err(PipelineError::TransientIo(format!(
                    "Failed to download s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&err)
                )));
            },
        };

        let version = ObjectVersion(response.e_tag().unwrap_or_default().to_string());
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| {
                PipelineError::TransientIo(format!("Failed to read S3 response body: {}", e))
            })?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(Some(StoredObject { data, version }))
    }

    #[instrument(skip(self, data))]
    async fn put_if(
        &self,
        key: &str,
        data: Vec<u8>,
        condition: PutCondition,
    ) -> Result<PutOutcome> {
        debug!(
            "Uploading {} bytes to s3://{}/{} ({:?})",
            data.len(),
            self.bucket,
            key,
            condition
        );

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type_for(key))
            .body(ByteStream::from(data));

        request = match condition {
            PutCondition::Always => request,
            PutCondition::IfAbsent => request.if_none_match("*"),
            PutCondition::IfMatch(version) => request.if_match(version.0),
        };

        match request.send().await {
            Ok(_) => {
                info!("Successfully uploaded to s3://{}/{}", self.bucket, key);
                Ok(PutOutcome::Written)
            },
            Err(err) => {
                // 412 Precondition Failed, or 409 when a conditional create races another
                let status = err.raw_response().map(|r| r.status().as_u16());
                if matches!(status, Some(412) | Some(409)) {
                    debug!("Conditional write to s3://{}/{} rejected", self.bucket, key);
                    return Ok(PutOutcome::ConditionFailed);
                }
                Err(PipelineError::TransientIo(format!(
                    "Failed to upload s3://{}/{}: {}",
                    self.bucket,
                    key,
                    DisplayErrorContext(&err)
                )))
            },
        }
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        debug!("Listing objects in s3://{}/{}", self.bucket, prefix);

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    PipelineError::TransientIo(format!(
                        "Failed to list s3://{}/{}: {}",
                        self.bucket,
                        prefix,
                        DisplayErrorContext(&e)
                    ))
                })?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!("Listed {} objects under s3://{}/{}", keys.len(), self.bucket, prefix);

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(
            content_type_for("cricsheet_data/new_cricsheet_data/1.json"),
            "application/json"
        );
        assert_eq!(content_type_for("cricsheet_data/output/matchwise_data.csv"), "text/csv");
        assert_eq!(content_type_for("archive.zip"), "application/octet-stream");
    }
}
