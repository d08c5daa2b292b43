use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::core::config::Settings;

/// Size and hex SHA-256 of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadedObject {
    pub(crate) size: i64,
    pub(crate) sha256: String,
}

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    /// `None` when no S3 credentials are configured; lecture files are then unavailable.
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        let s3 = settings.s3();
        if !s3.has_credentials() {
            return Ok(None);
        }

        let credentials = Credentials::new(
            s3.access_key.clone(),
            s3.secret_key.clone(),
            None,
            None,
            "coursehub-env",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(s3.endpoint.as_str())
            .region(Region::new(s3.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        // Path-style addressing keeps MinIO-style endpoints working.
        let config = aws_sdk_s3::config::Builder::from(&shared).force_path_style(true).build();

        Ok(Some(Self { client: Client::from_conf(config), bucket: s3.bucket.clone() }))
    }

    pub(crate) fn bucket(&self) -> &str {
        &self.bucket
    }

    pub(crate) async fn presign_get(
        &self,
        key: &str,
        download_name: Option<&str>,
        expires_in: Duration,
    ) -> anyhow::Result<String> {
        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(name) = download_name {
            request = request.response_content_disposition(format!("attachment; filename=\"{name}\""));
        }
        let presigned = request.presigned(PresigningConfig::expires_in(expires_in)?).await?;

        Ok(presigned.uri().to_string())
    }

    pub(crate) async fn upload_bytes(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<UploadedObject> {
        let size = bytes.len() as i64;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await?;

        Ok(UploadedObject { size, sha256 })
    }

    pub(crate) async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client.delete_object().bucket(&self.bucket).key(key).send().await?;
        Ok(())
    }

    /// Deletes every key, logging failures instead of returning them.
    pub(crate) async fn delete_best_effort(&self, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.delete_object(key).await {
                tracing::warn!(error = %err, key = %key, "Failed to delete stored object");
            }
        }
    }
}
