//! S3-compatible binary store
//!
//! Works against AWS S3 or a MinIO endpoint. Binaries land under the same
//! sharded key scheme the filesystem store uses, so either backend can be
//! inspected with the other's tooling.

use super::{BinaryStore, StoredBinary};
use crate::error::TransferError;
use crate::repository::BinarySlot;
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use drp_common::checksum::MultiDigest;
use drp_common::types::{DigestAlgorithm, Pid};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
}

impl S3Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::var("S3_ENDPOINT").ok(),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "drp-objects".to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|_| "minioadmin".to_string()),
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
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
        }
    }

    pub fn for_aws(region: impl Into<String>, bucket: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: None,
            region: region.into(),
            bucket: bucket.into(),
            access_key: env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID must be set")?,
            secret_key: env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY must be set")?,
            path_style: false,
        })
    }
}

#[derive(Clone)]
pub struct S3BinaryStore {
    client: Client,
    bucket: String,
}

impl S3BinaryStore {
    pub fn new(config: S3Config) -> Self {
        debug!("Initializing S3 binary store with config: {:?}", config);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "drp-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!("S3 binary store initialized for bucket: {}", config.bucket);

        Self {
            client,
            bucket: config.bucket,
        }
    }

    /// Key for one binary, sharded the same way as the filesystem layout.
    pub fn object_key(&self, pid: &Pid, slot: BinarySlot) -> String {
        let hex = pid.as_uuid().simple().to_string();
        format!("objects/{}/{}/{}/{}", &hex[0..2], &hex[2..4], hex, slot.as_str())
    }
}

#[async_trait]
impl BinaryStore for S3BinaryStore {
    #[instrument(skip(self, source, algorithms), fields(pid = %pid, slot = %slot))]
    async fn put(
        &self,
        pid: &Pid,
        slot: BinarySlot,
        source: &Path,
        algorithms: &[DigestAlgorithm],
    ) -> Result<StoredBinary, TransferError> {
        let key = self.object_key(pid, slot);
        let data = tokio::fs::read(source).await?;
        let size = data.len() as u64;

        let mut digest = MultiDigest::new(algorithms);
        digest.update(&data);
        let digests = digest.finalize();

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .send()
            .await
            .context("Failed to upload to S3")
            .map_err(TransferError::Store)?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);

        Ok(StoredBinary {
            uri: format!("s3://{}/{}", self.bucket, key),
            size,
            digests,
        })
    }

    #[instrument(skip(self), fields(pid = %pid, slot = %slot))]
    async fn remove(&self, pid: &Pid, slot: BinarySlot) -> Result<(), TransferError> {
        let key = self.object_key(pid, slot);

        // S3 treats deleting an absent key as success, matching the trait.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to delete from S3: {}", key))
            .map_err(TransferError::Store)?;

        debug!("Deleted s3://{}/{}", self.bucket, key);

        Ok(())
    }
}
