//! Item photos kept in the blob store.

use std::path::Path;
use uuid::Uuid;

use crate::store::BlobStore;

/// A fresh `<uuid>.<ext>` object name for an image called `file_name`.
pub fn blob_name_for(file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string());
    format!("{}.{}", Uuid::new_v4(), ext)
}

/// Uploads an item photo and returns its public URL.
///
/// A failed upload is logged and yields `None`; the item is then saved
/// without a photo.
pub async fn upload_image<B: BlobStore + ?Sized>(
    blobs: &B,
    file_name: &str,
    bytes: Vec<u8>,
    content_type: Option<&str>,
) -> Option<String> {
    let name = blob_name_for(file_name);
    match blobs.upload(&name, bytes, content_type).await {
        Ok(()) => Some(blobs.public_url(&name)),
        Err(e) => {
            tracing::warn!("image upload for {} failed: {}", file_name, e);
            None
        }
    }
}
