//! Item images on the local filesystem.
//!
//! Images are stored flat in the blob directory:
//! ```text
//! <BLOB_DIR>/
//!   3f2a9c1e-....jpg
//!   7b01d4aa-....png
//! ```

use async_trait::async_trait;
use shoplist_core::store::{validate_blob_name, BlobError, BlobStore};
use std::io;
use std::path::PathBuf;

/// Filesystem-backed blob store serving public URLs under `/storage/`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
    public_url: String,
}

fn io_err(name: &str, e: io::Error) -> BlobError {
    BlobError::Io {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

impl FsBlobStore {
    /// `public_url` is the server's externally visible base URL.
    pub fn new(dir: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn path(&self, name: &str) -> Result<PathBuf, BlobError> {
        validate_blob_name(name)?;
        Ok(self.dir.join(name))
    }

    /// Reads a stored object.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(name.to_string()))
            }
            Err(e) => Err(io_err(name, e)),
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<(), BlobError> {
        let path = self.path(name)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(name, e))?;

        // Write atomically using temp file + rename
        let temp_path = self.dir.join(format!("{}.tmp", name));
        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| io_err(name, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| io_err(name, e))?;

        tracing::debug!("stored blob {} ({} bytes)", name, bytes.len());
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}/storage/{}", self.public_url, name)
    }

    async fn remove(&self, names: &[String]) -> Result<(), BlobError> {
        for name in names {
            let path = self.path(name)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("removed blob {}", name),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(name, e)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upload_read_remove() {
        let temp_dir = tempdir().unwrap();
        let blobs = FsBlobStore::new(temp_dir.path().join("blobs"), "http://localhost:8080/");

        blobs.upload("a.jpg", vec![1, 2, 3], Some("image/jpeg")).await.unwrap();
        assert_eq!(blobs.read("a.jpg").await.unwrap(), vec![1, 2, 3]);
        assert_eq!(
            blobs.public_url("a.jpg"),
            "http://localhost:8080/storage/a.jpg"
        );

        blobs
            .remove(&["a.jpg".to_string(), "never-existed.png".to_string()])
            .await
            .unwrap();
        assert_eq!(
            blobs.read("a.jpg").await.unwrap_err(),
            BlobError::NotFound("a.jpg".into())
        );
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let temp_dir = tempdir().unwrap();
        let blobs = FsBlobStore::new(temp_dir.path(), "http://localhost:8080");

        let err = blobs.upload("../escape.jpg", vec![0], None).await.unwrap_err();
        assert!(matches!(err, BlobError::InvalidName(_)));
        assert!(blobs.read("../../etc/passwd").await.is_err());
    }
}
