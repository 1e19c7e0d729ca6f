//! Keeps the active shopping list in step with the remote store.
//!
//! ## Model
//!
//! 1. Every mutation is applied to the local list first
//! 2. The remote write is then issued and the change is logged as pending
//! 3. On success the pending entry is dropped; on failure it is rolled back
//!    and recorded as a [`MutationFailure`]
//! 4. Change notifications from the store trigger a full reload, with any
//!    still-pending mutations re-applied on top

mod error;
mod manager;
mod pending;
mod reconcile;

pub use error::{CascadeStage, SyncError};
pub use manager::{ArchiveSweep, ListSyncManager, SyncPhase};
pub use pending::{Mutation, MutationFailure, PendingMutation};
pub use reconcile::ReconcileHandle;

