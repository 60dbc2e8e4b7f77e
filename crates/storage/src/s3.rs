//! S3 (or S3-compatible) blob store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use imgproc_core::naming::{now_nanos, timestamped_key};

use crate::config::S3Config;
use crate::error::BlobError;
use crate::{validate_key, BlobStore};

/// Region used for request signing when none is configured.
const DEFAULT_REGION: &str = "us-east-1";

/// Stores blobs as objects in a single bucket, optionally under a prefix.
///
/// The prefix is an implementation detail: keys handed to callers never
/// include it.
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3BlobStore {
    /// Build a client from static credentials.
    ///
    /// A custom `endpoint_url` switches to path-style addressing, which
    /// MinIO and LocalStack require.
    pub async fn connect(config: &S3Config) -> Result<Self, BlobError> {
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(BlobError::Config("S3 credentials are empty".into()));
        }
        if config.bucket.is_empty() {
            return Err(BlobError::Config("S3 bucket name cannot be empty".into()));
        }

        let region = config.region.clone().unwrap_or_else(|| {
            tracing::warn!(
                region = DEFAULT_REGION,
                "S3 region not provided, using default for signing"
            );
            DEFAULT_REGION.to_string()
        });

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "imgproc-static",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        })
    }

    fn object_key(&self, key: &str) -> String {
        object_key(&self.prefix, key)
    }
}

/// Full object key for `key` under `prefix`.
fn object_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn save(&self, filename: &str, data: Vec<u8>) -> Result<String, BlobError> {
        let key = timestamped_key(filename, now_nanos());
        validate_key(&key)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(&key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                BlobError::Backend(format!(
                    "Failed to upload to bucket {} with key {key}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        validate_key(key)?;

        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(BlobError::NotFound(key.to_string()));
            }
            Err(e) => {
                return Err(BlobError::Backend(format!(
                    "Failed to get {key} from bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                )));
            }
        };

        let body = output.body.collect().await.map_err(|e| {
            BlobError::Backend(format!("Failed to read body of {key}: {e}"))
        })?;
        Ok(body.into_bytes().to_vec())
    }

    /// S3 reports no error for a missing object, so neither does this.
    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        validate_key(key)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| {
                BlobError::Backend(format!(
                    "Failed to delete {key} from bucket {}: {}",
                    self.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}
