//! S3-compatible object storage for board media.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;

use domains::{DomainError, ObjectStore, Result};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Credentials come from the standard AWS provider chain. A custom
    /// endpoint (MinIO, R2, ...) switches to path-style addressing.
    pub async fn connect(bucket: &str, region: &str, endpoint: Option<&str>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self { client: Client::from_conf(builder.build()), bucket: bucket.to_string() }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    /// S3 answers a delete of a missing key with success.
    async fn delete(&self, path: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| DomainError::internal(DisplayErrorContext(&e)))?;
        Ok(())
    }
}
