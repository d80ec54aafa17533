//! Object storage for preview images.
//!
//! Backed by a local directory, process memory, or an S3-compatible bucket.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use wms_common::{WmsError, WmsResult};

/// Where preview images are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum ObjectStorageConfig {
    /// Files under a root directory (created if missing)
    Local { root: PathBuf },

    /// Process memory; contents are lost on exit
    Memory,

    /// S3/MinIO bucket
    S3 {
        endpoint: String,
        bucket: String,
        access_key_id: String,
        secret_access_key: String,
        /// Use "us-east-1" for MinIO
        region: String,
        allow_http: bool,
    },
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from("media"),
        }
    }
}

/// Object storage client for preview images.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    location: String,
}

impl ObjectStorage {
    /// Create a client from config.
    pub fn new(config: &ObjectStorageConfig) -> WmsResult<Self> {
        match config {
            ObjectStorageConfig::Local { root } => {
                std::fs::create_dir_all(root)?;
                let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
                    WmsError::Storage(format!(
                        "Failed to open {}: {}",
                        root.display(),
                        e
                    ))
                })?;
                Ok(Self {
                    store: Arc::new(store),
                    location: root.display().to_string(),
                })
            }
            ObjectStorageConfig::Memory => Ok(Self::in_memory()),
            ObjectStorageConfig::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_bucket_name(bucket)
                    .with_access_key_id(access_key_id)
                    .with_secret_access_key(secret_access_key)
                    .with_region(region);

                if *allow_http {
                    builder = builder.with_allow_http(true);
                }

                let store = builder.build().map_err(|e| {
                    WmsError::Storage(format!("Failed to create S3 client: {}", e))
                })?;

                Ok(Self {
                    store: Arc::new(store),
                    location: format!("s3://{}", bucket),
                })
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            location: "memory".to_string(),
        }
    }

    /// Write bytes to a path.
    #[instrument(skip(self, data), fields(location = %self.location, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> WmsResult<()> {
        let object = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&object, data.into())
            .await
            .map_err(|e| WmsError::Storage(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(location = %self.location, path = %path))]
    pub async fn get(&self, path: &str) -> WmsResult<Bytes> {
        let object = Path::from(path);

        let result = self
            .store
            .get(&object)
            .await
            .map_err(|e| WmsError::Storage(format!("Failed to read {}: {}", path, e)))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| WmsError::Storage(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Delete an object. Missing objects are not an error.
    #[instrument(skip(self), fields(location = %self.location, path = %path))]
    pub async fn delete(&self, path: &str) -> WmsResult<()> {
        let object = Path::from(path);

        match self.store.delete(&object).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(WmsError::Storage(format!(
                "Failed to delete {}: {}",
                path, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let storage = ObjectStorage::in_memory();
        let path = "wms_preview/flood-maps_20240101_000000.png";

        assert!(matches!(storage.get(path).await, Err(WmsError::Storage(_))));
        storage.put(path, Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(storage.get(path).await.unwrap(), Bytes::from_static(b"abc"));

        storage.delete(path).await.unwrap();
        assert!(storage.get(path).await.is_err());
        storage.delete(path).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("media");
        let storage = ObjectStorage::new(&ObjectStorageConfig::Local { root: root.clone() }).unwrap();

        storage
            .put("wms_preview/a.jpeg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        assert!(root.join("wms_preview").join("a.jpeg").is_file());
    }

    #[tokio::test]
    async fn test_missing_object_is_storage_error() {
        let storage = ObjectStorage::in_memory();
        assert!(matches!(
            storage.get("nope").await,
            Err(WmsError::Storage(_))
        ));
    }

    #[test]
    fn test_config_backend_tag() {
        let config: ObjectStorageConfig =
            serde_json::from_str(r#"{"backend": "local", "root": "/srv/media"}"#).unwrap();
        assert_eq!(
            config,
            ObjectStorageConfig::Local {
                root: PathBuf::from("/srv/media")
            }
        );
    }
}
