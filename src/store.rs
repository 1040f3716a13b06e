use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use std::path::Path;

use crate::config::StoreConfig;

/// Destination for flattened event files. The upload loop only ever talks to
/// this trait, so it can be exercised without a real bucket.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Store the file at `path` under `key`. Overwrites any existing object.
    async fn put(&self, key: &str, path: &Path) -> Result<()>;
}

/// S3-backed sink. Uploads stream from disk via `ByteStream::from_path`
/// rather than buffering whole files.
pub struct S3Sink {
    client: Client,
    bucket: String,
}

impl S3Sink {
    /// Build a client from explicit credentials when the config carries
    /// them, otherwise fall back to the SDK's default provider chain.
    pub async fn new(config: &StoreConfig) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let (Some(access), Some(secret)) = (&config.access_key, &config.secret_key) {
            let credentials =
                aws_sdk_s3::config::Credentials::new(access, secret, None, None, "ampetl-env");
            loader = loader.credentials_provider(credentials);
        }

        let sdk_config = loader.load().await;
        Ok(S3Sink {
            client: Client::new(&sdk_config),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    async fn put(&self, key: &str, path: &Path) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload s3://{}/{}", self.bucket, key))?;

        Ok(())
    }
}
