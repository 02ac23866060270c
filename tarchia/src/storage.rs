/*!
Blob storage abstraction over `object_store`
*/

use std::sync::Arc;

use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use url::Url;

use crate::error::{Error, Result};

/// Reads and writes opaque blobs: commit records, manifests and history
/// files all go through this trait so the engine never depends on a
/// concrete backend.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn write_blob(&self, location: &str, content: Vec<u8>) -> Result<()>;
    async fn read_blob(&self, location: &str) -> Result<Option<Vec<u8>>>;
}

/// Reference implementation backed by `object_store::local::LocalFileSystem`,
/// rooted at a configured directory.
pub struct LocalStorage {
    store: Arc<LocalFileSystem>,
}

impl LocalStorage {
    pub fn new(root: &str) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root).map_err(Error::ObjectStore)?;
        Ok(Self { store: Arc::new(store) })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn write_blob(&self, location: &str, content: Vec<u8>) -> Result<()> {
        let path = ObjectPath::from(location);
        self.store.put(&path, content.into()).await?;
        Ok(())
    }

    async fn read_blob(&self, location: &str) -> Result<Option<Vec<u8>>> {
        let path = ObjectPath::from(location);
        match self.store.get(&path).await {
            Ok(result) => Ok(Some(result.bytes().await?.to_vec())),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Resolves a `scheme://bucket/key` data-file URL to the matching
/// `object_store` backend, for reading Parquet footers when building
/// manifest entries. Supports `s3`, `gs` and bare local paths.
pub fn dispatch_by_scheme(location: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
    if !location.contains("://") {
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new());
        return Ok((store, ObjectPath::from(location)));
    }

    let url = Url::parse(location)?;
    let path = ObjectPath::from(url.path().trim_start_matches('/'));

    match url.scheme() {
        "s3" => {
            let bucket = url.host_str().unwrap_or_default();
            let store = object_store::aws::AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(Error::ObjectStore)?;
            Ok((Arc::new(store), path))
        }
        "gs" => {
            let bucket = url.host_str().unwrap_or_default();
            let store = object_store::gcp::GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(Error::ObjectStore)?;
            Ok((Arc::new(store), path))
        }
        "file" => {
            let store: Arc<dyn ObjectStore> = Arc::new(LocalFileSystem::new());
            Ok((store, path))
        }
        other => Err(Error::Transaction(format!(
            "unsupported storage scheme '{other}'"
        ))),
    }
}

#[cfg(feature = "testutils")]
pub mod testutils {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-memory `Storage` for engine tests.
    #[derive(Default)]
    pub struct MemoryStorage {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl Storage for MemoryStorage {
        async fn write_blob(&self, location: &str, content: Vec<u8>) -> Result<()> {
            self.blobs.lock().await.insert(location.to_string(), content);
            Ok(())
        }

        async fn read_blob(&self, location: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.blobs.lock().await.get(location).cloned())
        }
    }
}
