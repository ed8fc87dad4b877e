//! S3-compatible store client.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use super::{ObjectEntry, ObjectStore, StoreError, StoreResult};

/// Connection settings for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Custom endpoint (R2, MinIO, Spaces...). `None` uses AWS.
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl StoreConfig {
    fn validate(&self) -> StoreResult<()> {
        if self.region.trim().is_empty() {
            return Err(StoreError::config("region must not be empty"));
        }
        if self.access_key_id.is_empty() || self.secret_access_key.is_empty() {
            return Err(StoreError::config("access key and secret key are required"));
        }
        Ok(())
    }
}

/// [`ObjectStore`] backed by the AWS SDK.
#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "imgsync",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }
}

/// Token for the page after this one, `None` when the listing is complete.
///
/// A truncated page without a token cannot be continued; restarting from the
/// first page would loop forever.
fn next_page(
    bucket: &str,
    is_truncated: Option<bool>,
    token: Option<String>,
) -> StoreResult<Option<String>> {
    match (is_truncated, token) {
        (Some(true), Some(token)) => Ok(Some(token)),
        (Some(true), None) => Err(StoreError::unavailable(
            bucket,
            "listing truncated without a continuation token",
        )),
        _ => Ok(None),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, bucket: &str) -> StoreResult<Vec<ObjectEntry>> {
        debug!("Listing objects in {}", bucket);

        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket);
            if let Some(token) = continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| StoreError::unavailable(bucket, e.to_string()))?;

            for obj in response.contents() {
                if let (Some(key), Some(etag)) = (obj.key(), obj.e_tag()) {
                    objects.push(ObjectEntry {
                        key: key.to_string(),
                        etag: etag.to_string(),
                    });
                }
            }

            continuation_token = next_page(
                bucket,
                response.is_truncated(),
                response.next_continuation_token,
            )?;
            if continuation_token.is_none() {
                break;
            }
        }

        info!("Listed {} objects in {}", objects.len(), bucket);
        Ok(objects)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> StoreResult<()> {
        debug!("Uploading {} bytes to {}/{}", body.len(), bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::write(bucket, key, e.to_string()))?;

        Ok(())
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StoreResult<()> {
        debug!("Uploading {} to {}/{}", path.display(), bucket, key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::write(bucket, key, e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StoreError::write(bucket, key, e.to_string()))?;

        info!("Uploaded {} to {}/{}", path.display(), bucket, key);
        Ok(())
    }
}
