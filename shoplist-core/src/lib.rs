//! Shoplist Core Library
//!
//! Models, the remote-store contract and the list/history sync logic shared
//! by the Shoplist server and CLI.

pub mod history;
pub mod images;
pub mod models;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use history::{dedup_products, CascadePlan, CascadeReport, HistoryView, Selection};
pub use images::{blob_name_for, upload_image};
pub use models::{
    ArchiveStatus, HistoryEntry, HistoryItem, HistoryProduct, HistoryRecord, NewItem,
    ShoppingItem, DEFAULT_UNIT,
};
pub use store::{
    BlobError, BlobStore, ChangeEvent, ChangeFeed, ChangeHub, ChangeKind, Collection, Filter,
    Query, Record, RemoteStore, StoreError,
};
pub use sync::{
    ArchiveSweep, CascadeStage, ListSyncManager, Mutation, MutationFailure, PendingMutation,
    ReconcileHandle, SyncError, SyncPhase,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
