// S3-compatible blob store; one bucket per container

use super::BlobStore;
use crate::config::StorageConfig;
use crate::errors::UploadError;
use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tracing::{debug, error, info, instrument};

#[derive(Clone, Debug)]
pub struct S3BlobStore {
    region: Region,
    credentials: Credentials,
}

impl S3BlobStore {
    /// Create a store from configuration
    #[instrument(skip(config), fields(endpoint = %config.endpoint))]
    pub fn new(config: &StorageConfig) -> Result<Self, UploadError> {
        // Region::Custom expects the endpoint without scheme
        let endpoint = config
            .endpoint
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();

        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| {
            error!(error = %e, "Failed to create storage credentials");
            UploadError::Transport(format!("Failed to create credentials: {}", e))
        })?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint,
        };

        info!(endpoint = %config.endpoint, "Blob store client initialized");
        Ok(Self {
            region,
            credentials,
        })
    }

    fn bucket(&self, container: &str) -> Result<Bucket, UploadError> {
        let bucket = Bucket::new(container, self.region.clone(), self.credentials.clone())
            .map_err(|e| {
                UploadError::Transport(format!("Invalid container '{}': {}", container, e))
            })?
            .with_path_style();
        Ok(bucket)
    }
}

fn is_not_found(err: &S3Error) -> bool {
    matches!(err, S3Error::HttpFailWithBody(404, _))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self))]
    async fn container_exists(&self, container: &str) -> Result<bool, UploadError> {
        let bucket = self.bucket(container)?;
        match bucket
            .list_page(String::new(), Some("/".to_string()), None, None, Some(1))
            .await
        {
            Ok((_, status)) if is_success(status) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => Err(UploadError::Transport(format!(
                "Listing container '{}' returned status {}",
                container, status
            ))),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => {
                error!(error = %e, "Failed to check container");
                Err(UploadError::Transport(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn blob_exists(&self, container: &str, blob: &str) -> Result<bool, UploadError> {
        let bucket = self.bucket(container)?;
        match bucket.head_object(blob).await {
            Ok((_, status)) if is_success(status) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => Err(UploadError::Transport(format!(
                "Checking blob '{}' returned status {}",
                blob, status
            ))),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => {
                error!(error = %e, "Failed to check blob existence");
                Err(UploadError::Transport(e.to_string()))
            }
        }
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), UploadError> {
        // S3 has no conditional create here; check first
        if !overwrite && self.blob_exists(container, blob).await? {
            return Err(UploadError::AlreadyExists {
                blob: blob.to_string(),
            });
        }

        let bucket = self.bucket(container)?;
        let response = bucket.put_object(blob, &data).await.map_err(|e| {
            error!(error = %e, "Failed to store blob");
            UploadError::Transport(format!("Failed to put blob '{}': {}", blob, e))
        })?;

        if !is_success(response.status_code()) {
            return Err(UploadError::Transport(format!(
                "Storing blob '{}' returned status {}",
                blob,
                response.status_code()
            )));
        }

        debug!("Blob stored");
        Ok(())
    }
}
