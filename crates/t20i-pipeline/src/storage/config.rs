use serde::{Deserialize, Serialize};
use std::env;
use t20i_common::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: crate::config::required("DOWNLOAD_BUCKET_NAME")?,
            access_key: env::var("S3_ACCESS_KEY").ok(),
            secret_key: env::var("S3_SECRET_KEY").ok(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
        }
    }

    pub fn for_aws(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: None,
            region: region.into(),
            bucket: bucket.into(),
            access_key: None,
            secret_key: None,
            path_style: false,
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key.is_some() && self.secret_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_minio() {
        let config = StorageConfig::for_minio("http://localhost:9000", "t20i-test");
        assert_eq!(config.endpoint, Some("http://localhost:9000".to_string()));
        assert_eq!(config.bucket, "t20i-test");
        assert!(config.path_style);
        assert!(config.has_static_credentials());
    }

    #[test]
    fn test_for_aws_uses_provider_chain() {
        let config = StorageConfig::for_aws("ap-south-1", "t20i-bucket");
        assert_eq!(config.endpoint, None);
        assert_eq!(config.region, "ap-south-1");
        assert!(!config.has_static_credentials());
        assert!(!config.path_style);
    }
}
