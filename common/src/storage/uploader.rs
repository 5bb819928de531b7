// Blob uploader: publishes a record's access files under its subpath

use super::BlobStore;
use crate::errors::UploadError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// One local file and the blob name it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub local_path: PathBuf,
    /// `{unique_id}/{filename}`
    pub remote_subpath: String,
}

impl UploadItem {
    /// Key `local_path` under `{unique_id}/{filename}`
    pub fn for_record(unique_id: &str, local_path: PathBuf) -> Self {
        let filename = local_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            remote_subpath: format!("{}/{}", unique_id, filename),
            local_path,
        }
    }
}

#[derive(Clone)]
pub struct BlobUploader {
    store: Arc<dyn BlobStore>,
}

impl BlobUploader {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Upload every item to `container`.
    ///
    /// Without `overwrite` all targets are checked before the first write, so
    /// an `AlreadyExists` result means nothing was uploaded.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn upload(
        &self,
        container: &str,
        items: &[UploadItem],
        overwrite: bool,
    ) -> Result<(), UploadError> {
        if items.is_empty() {
            debug!("Nothing to upload");
            return Ok(());
        }

        if !self.store.container_exists(container).await? {
            return Err(UploadError::ContainerNotFound(container.to_string()));
        }

        for item in items {
            if !item.local_path.is_file() {
                return Err(UploadError::SourceMissing(item.local_path.clone()));
            }
        }

        if !overwrite {
            for item in items {
                if self
                    .store
                    .blob_exists(container, &item.remote_subpath)
                    .await?
                {
                    return Err(UploadError::AlreadyExists {
                        blob: item.remote_subpath.clone(),
                    });
                }
            }
        }

        for item in items {
            let data = tokio::fs::read(&item.local_path)
                .await
                .map_err(|e| UploadError::Io {
                    path: item.local_path.clone(),
                    reason: e.to_string(),
                })?;
            self.store
                .put_blob(container, &item.remote_subpath, data, overwrite)
                .await?;
            debug!(blob = %item.remote_subpath, "Uploaded");
        }

        info!(container = %container, count = items.len(), "Access files uploaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockBlobStore;
    use mockall::predicate::eq;

    fn items(dir: &std::path::Path) -> Vec<UploadItem> {
        ["000123_s.jpg", "000123_m.jpg"]
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, name.as_bytes()).unwrap();
                UploadItem::for_record("000123", path)
            })
            .collect()
    }

    #[test]
    fn test_item_subpath() {
        let item = UploadItem::for_record("000123", PathBuf::from("/access/000123/000123_s.jpg"));
        assert_eq!(item.remote_subpath, "000123/000123_s.jpg");
    }

    #[tokio::test]
    async fn test_empty_list_is_noop() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().never();
        store.expect_put_blob().never();

        let uploader = BlobUploader::new(Arc::new(store));
        uploader.upload("test", &[], false).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_container() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MockBlobStore::new();
        store
            .expect_container_exists()
            .with(eq("nope"))
            .returning(|_| Ok(false));
        store.expect_put_blob().never();

        let err = BlobUploader::new(Arc::new(store))
            .upload("nope", &items(dir.path()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::ContainerNotFound(c) if c == "nope"));
    }

    #[tokio::test]
    async fn test_existing_blob_stops_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store
            .expect_blob_exists()
            .returning(|_, blob| Ok(blob.ends_with("_m.jpg")));
        store.expect_put_blob().never();

        let err = BlobUploader::new(Arc::new(store))
            .upload("test", &items(dir.path()), false)
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_overwrite_skips_existence_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_blob_exists().never();
        store
            .expect_put_blob()
            .withf(|container, blob, data, overwrite| {
                container == "test" && blob.starts_with("000123/") && !data.is_empty() && *overwrite
            })
            .times(2)
            .returning(|_, _, _, _| Ok(()));

        BlobUploader::new(Arc::new(store))
            .upload("test", &items(dir.path()), true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_put_blob().never();

        let missing = vec![UploadItem::for_record("000123", dir.path().join("gone.jpg"))];
        let err = BlobUploader::new(Arc::new(store))
            .upload("test", &missing, false)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn test_transport_error_is_propagated() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_blob_exists().returning(|_, _| Ok(false));
        store
            .expect_put_blob()
            .returning(|_, _, _, _| Err(UploadError::Transport("connection reset".to_string())));

        let err = BlobUploader::new(Arc::new(store))
            .upload("test", &items(dir.path()), false)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Transport(_)));
        assert!(!err.is_already_exists());
    }
}
