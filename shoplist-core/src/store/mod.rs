//! The remote store contract.
//!
//! All persistence is delegated to a hosted backend reached through two
//! traits: [`RemoteStore`] for collections of JSON records plus a change
//! feed, and [`BlobStore`] for images. The SQLite-backed server and the HTTP
//! client both implement them, so the list logic never sees the transport.

mod error;
mod feed;
mod query;

use async_trait::async_trait;

pub use error::{BlobError, StoreError};
pub use feed::{ChangeEvent, ChangeFeed, ChangeHub, ChangeKind};
pub use query::{Collection, Column, ColumnKind, Condition, Filter, Order, Query, Record};

/// Query/command access to the hosted database.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches records matching `query`.
    async fn select(&self, collection: Collection, query: &Query)
        -> Result<Vec<Record>, StoreError>;

    /// Appends records, returning them as stored (with `id` and timestamp).
    ///
    /// A bulk insert either stores every record or none.
    async fn insert(
        &self,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Applies `patch` to every record matching `filter`.
    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> Result<u64, StoreError>;

    /// Removes every record matching `filter`.
    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError>;

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError>;

    /// Subscribes to insert/update/delete notifications for `collection`.
    async fn subscribe(&self, collection: Collection) -> Result<ChangeFeed, StoreError>;
}

/// Named binary objects with public references.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), BlobError>;

    /// Public reference for a stored object.
    fn public_url(&self, name: &str) -> String;

    /// Removes objects; names that do not exist are ignored.
    async fn remove(&self, names: &[String]) -> Result<(), BlobError>;
}

/// Validates a blob name to prevent path traversal.
pub fn validate_blob_name(name: &str) -> Result<(), BlobError> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(BlobError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Recovers the blob name from a public URL (its last path segment).
pub fn blob_name_from_url(url: &str) -> Option<&str> {
    let path = url.split(|c: char| c == '?' || c == '#').next()?;
    let name = path.rsplit('/').next()?;
    validate_blob_name(name).ok().map(|_| name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_blob_name() {
        assert!(validate_blob_name("3f2a.jpg").is_ok());
        assert!(validate_blob_name("").is_err());
        assert!(validate_blob_name("../etc/passwd").is_err());
        assert!(validate_blob_name("a/b.jpg").is_err());
        assert!(validate_blob_name(".hidden").is_err());
    }

    #[test]
    fn test_blob_name_from_url() {
        assert_eq!(
            blob_name_from_url("http://localhost:8080/storage/3f2a.jpg"),
            Some("3f2a.jpg")
        );
        assert_eq!(
            blob_name_from_url("https://cdn.example.com/storage/3f2a.png?v=2"),
            Some("3f2a.png")
        );
        assert_eq!(blob_name_from_url("http://localhost:8080/storage/"), None);
    }
}
