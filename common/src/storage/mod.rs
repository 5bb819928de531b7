// Blob storage for access files
// The uploader is written against `BlobStore`; `S3BlobStore` is the
// production backend.

pub mod s3_store;
pub mod uploader;

pub use self::s3_store::S3BlobStore;
pub use self::uploader::{BlobUploader, UploadItem};

use crate::errors::UploadError;
use async_trait::async_trait;

/// Container-addressed blob store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn container_exists(&self, container: &str) -> Result<bool, UploadError>;

    async fn blob_exists(&self, container: &str, blob: &str) -> Result<bool, UploadError>;

    /// Store `data` under `blob`. Without `overwrite` an existing blob is
    /// reported as `UploadError::AlreadyExists` and left untouched.
    async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), UploadError>;
}
