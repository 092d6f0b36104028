//! Blob storage seam.
//!
//! The store only records keys; the bytes live behind [`BlobStore`]. Keys are
//! `/`-separated relative paths built by [`UploadCategory::key_for`].

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use nerfline_types::UploadCategory;
use tracing::debug;

use crate::config::Config;
use crate::entities::ObjectFiles;
use crate::error::StoreError;

pub trait BlobStore: Send + Sync + 'static {
    /// Store `bytes` under `category` and return the key. An existing blob
    /// with the same key is replaced.
    fn put(
        &self,
        category: &UploadCategory,
        filename: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;

    /// Remove a blob. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// A named file waiting to be uploaded.
#[derive(Debug, Clone, Copy)]
pub struct Upload<'a> {
    pub filename: &'a str,
    pub bytes: &'a [u8],
}

/// Upload the three files of an exported object into its own prefix.
///
/// The object row has to exist first since its id names the prefix; pass the
/// returned keys to `NerfObjectStore::attach_object_files`.
pub async fn put_object_files<B: BlobStore>(
    blobs: &B,
    nerf_object_id: &str,
    object: Upload<'_>,
    texture: Upload<'_>,
    material: Upload<'_>,
) -> Result<ObjectFiles, StoreError> {
    let category = UploadCategory::NerfObject(nerf_object_id.to_owned());
    Ok(ObjectFiles {
        object_file: blobs.put(&category, object.filename, object.bytes).await?,
        texture_file: blobs.put(&category, texture.filename, texture.bytes).await?,
        material_file: blobs.put(&category, material.filename, material.bytes).await?,
    })
}

/// Blobs as plain files under a root directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.blob_root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path under the root, refusing anything that could
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return Err(StoreError::Validation(format!("invalid blob key '{key}'")));
            }
            path.push(segment);
        }
        Ok(path)
    }
}

impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        category: &UploadCategory,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, StoreError> {
        let key = category.key_for(filename);
        let path = self.resolve(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key = %key, size = bytes.len(), "blob stored");
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::read(path).await?)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "blob removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
