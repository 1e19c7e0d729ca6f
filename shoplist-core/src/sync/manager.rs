//! The active shopping list, kept in step with the remote store.
//!
//! Mutations are applied to the local cache synchronously, before the remote
//! call is issued, and recorded in the pending log. When the remote answers
//! the entry is confirmed or rolled back. Changes from other clients arrive
//! through the change feed and trigger a full reload.

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::error::SyncError;
use super::pending::{insert_ordered, Mutation, MutationFailure, PendingMutation};
use super::reconcile::ReconcileHandle;
use crate::models::{
    ArchiveStatus, HistoryItem, HistoryRecord, NewItem, ShoppingItem, DEFAULT_UNIT,
};
use crate::store::{Collection, Filter, Query, Record, RemoteStore, StoreError};

/// Empty `archiving` trips younger than this may still be mid-archive on
/// another device and are left alone by the sweep.
const ABANDONED_ARCHIVE_GRACE_SECS: i64 = 60;

/// Where the manager is in its load cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Loading,
    Synced,
    /// A remote call failed since the last successful load
    Stale,
}

/// Outcome of finishing half-completed trip archives.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArchiveSweep {
    /// Trips whose active items were cleared and which are now complete
    pub completed: Vec<String>,
    /// Abandoned trips that never got their snapshots
    pub discarded: Vec<String>,
    /// Active item ids removed while completing trips
    pub cleared_ids: Vec<String>,
}

#[derive(Debug, Default)]
struct ListState {
    items: Vec<ShoppingItem>,
    loaded: bool,
    phase: SyncPhase,
    pending: Vec<PendingMutation>,
    failures: Vec<MutationFailure>,
    loads_started: u64,
    loads_applied: u64,
}

impl ListState {
    fn find(&self, id: &str) -> Option<&ShoppingItem> {
        self.items.iter().find(|i| i.id == id)
    }

    /// Applies `mutation` locally and logs it as pending.
    fn begin(&mut self, mutation: Mutation) -> Uuid {
        mutation.apply(&mut self.items);
        let pending = PendingMutation::new(mutation);
        let correlation_id = pending.correlation_id;
        self.pending.push(pending);
        correlation_id
    }

    fn record_failure(
        &mut self,
        correlation_id: Uuid,
        description: String,
        error: &StoreError,
        rolled_back: bool,
    ) {
        tracing::warn!(
            "{} failed{}: {}",
            description,
            if rolled_back { ", rolled back" } else { "" },
            error
        );
        self.failures.push(MutationFailure {
            correlation_id,
            description,
            error: error.to_string(),
            rolled_back,
            failed_at: Utc::now(),
        });
        self.phase = SyncPhase::Stale;
    }
}

/// Local cache of the active list plus the rules for changing it.
///
/// Cloning is cheap; clones share the same cache.
pub struct ListSyncManager<S: ?Sized> {
    store: Arc<S>,
    state: Arc<Mutex<ListState>>,
    default_unit: Arc<str>,
}

impl<S: ?Sized> Clone for ListSyncManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            default_unit: Arc::clone(&self.default_unit),
        }
    }
}

fn patch(field: &str, value: impl Into<Value>) -> Record {
    let mut record = Record::new();
    record.insert(field.to_string(), value.into());
    record
}

fn by_id(id: &str) -> Filter {
    Filter::all().eq("id", id)
}

fn first(records: Vec<Record>) -> Result<Record, StoreError> {
    records.into_iter().next().ok_or(StoreError::NotFound)
}

impl<S: RemoteStore + ?Sized> ListSyncManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(ListState::default())),
            default_unit: Arc::from(DEFAULT_UNIT),
        }
    }

    /// Unit given to items added with a blank unit.
    pub fn with_default_unit(mut self, unit: &str) -> Self {
        if !unit.trim().is_empty() {
            self.default_unit = Arc::from(unit.trim());
        }
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn state(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current items in creation order.
    pub fn items(&self) -> Vec<ShoppingItem> {
        self.state().items.clone()
    }

    pub fn item(&self, id: &str) -> Option<ShoppingItem> {
        self.state().find(id).cloned()
    }

    /// False until the first load has completed.
    pub fn is_loaded(&self) -> bool {
        self.state().loaded
    }

    pub fn phase(&self) -> SyncPhase {
        self.state().phase
    }

    /// Mutations still waiting for the remote.
    pub fn pending(&self) -> Vec<PendingMutation> {
        self.state().pending.clone()
    }

    /// Drains the failures recorded since the last call.
    pub fn take_failures(&self) -> Vec<MutationFailure> {
        std::mem::take(&mut self.state().failures)
    }

    fn confirm(&self, correlation_id: Uuid) {
        self.state()
            .pending
            .retain(|p| p.correlation_id != correlation_id);
    }

    fn fail(&self, correlation_id: Uuid, error: &StoreError, rollback: bool) {
        let mut st = self.state();
        let Some(pos) = st
            .pending
            .iter()
            .position(|p| p.correlation_id == correlation_id)
        else {
            return;
        };
        let pending = st.pending.remove(pos);
        if rollback {
            pending.mutation.revert(&mut st.items);
        }
        st.record_failure(
            correlation_id,
            pending.mutation.describe(),
            error,
            rollback,
        );
    }

    fn settle(&self, correlation_id: Uuid, result: Result<u64, StoreError>) -> Result<(), SyncError> {
        match result {
            Ok(affected) => {
                if affected == 0 {
                    tracing::debug!("remote write matched no rows; the next reload will converge");
                }
                self.confirm(correlation_id);
                Ok(())
            }
            Err(e) => {
                self.fail(correlation_id, &e, true);
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Fetches the whole list, replacing the local copy.
    ///
    /// Mutations still pending are re-applied on top of the fetched rows so
    /// an in-flight change does not flicker back. If several loads overlap,
    /// only the most recently started one that finishes wins.
    pub async fn load(&self) -> Result<(), SyncError> {
        let ticket = {
            let mut st = self.state();
            st.loads_started += 1;
            st.phase = SyncPhase::Loading;
            st.loads_started
        };

        let query = Query::new().order_by("created_at", true);
        let result = self
            .store
            .select(Collection::ShoppingItems, &query)
            .await
            .and_then(|records| {
                records
                    .into_iter()
                    .map(ShoppingItem::from_record)
                    .collect::<Result<Vec<_>, _>>()
            });

        let mut st = self.state();
        let latest = ticket == st.loads_started;
        match result {
            Ok(mut items) => {
                if ticket < st.loads_applied {
                    tracing::debug!("discarding load #{} superseded by #{}", ticket, st.loads_applied);
                    return Ok(());
                }
                for pending in &st.pending {
                    pending.mutation.apply(&mut items);
                }
                tracing::debug!("loaded {} item(s)", items.len());
                st.items = items;
                st.loaded = true;
                st.loads_applied = ticket;
                if latest {
                    st.phase = SyncPhase::Synced;
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("loading shopping list failed: {}", e);
                if latest {
                    st.phase = SyncPhase::Stale;
                }
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Adds an item. The local list gains the record exactly as the store
    /// accepted it, including the assigned id and timestamp.
    pub async fn add_item(&self, item: NewItem) -> Result<ShoppingItem, SyncError> {
        let item = item
            .normalized(&self.default_unit)
            .map_err(SyncError::Invalid)?;

        let stored = self
            .store
            .insert(Collection::ShoppingItems, vec![item.to_record()])
            .await
            .and_then(first)
            .and_then(ShoppingItem::from_record);

        let mut st = self.state();
        match stored {
            Ok(stored) => {
                insert_ordered(&mut st.items, stored.clone());
                Ok(stored)
            }
            Err(e) => {
                st.record_failure(Uuid::new_v4(), format!("add '{}'", item.name), &e, false);
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Adds several items with a single insert. Invalid entries are skipped.
    pub async fn add_items(&self, items: Vec<NewItem>) -> Result<Vec<ShoppingItem>, SyncError> {
        let valid: Vec<NewItem> = items
            .iter()
            .filter_map(|item| match item.normalized(&self.default_unit) {
                Ok(item) => Some(item),
                Err(reason) => {
                    tracing::debug!("skipping item: {}", reason);
                    None
                }
            })
            .collect();
        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let stored = self
            .store
            .insert(
                Collection::ShoppingItems,
                valid.iter().map(NewItem::to_record).collect(),
            )
            .await
            .and_then(|records| {
                records
                    .into_iter()
                    .map(ShoppingItem::from_record)
                    .collect::<Result<Vec<_>, _>>()
            });

        let mut st = self.state();
        match stored {
            Ok(stored) => {
                for item in &stored {
                    insert_ordered(&mut st.items, item.clone());
                }
                Ok(stored)
            }
            Err(e) => {
                st.record_failure(
                    Uuid::new_v4(),
                    format!("add {} item(s)", valid.len()),
                    &e,
                    false,
                );
                Err(SyncError::Remote(e))
            }
        }
    }

    /// Removes an item locally at once, then remotely.
    pub async fn remove_item(&self, id: &str) -> Result<(), SyncError> {
        let correlation_id = {
            let mut st = self.state();
            let item = st.find(id).cloned();
            item.map(|item| st.begin(Mutation::Remove { item }))
        };

        let result = self
            .store
            .delete(Collection::ShoppingItems, &by_id(id))
            .await;
        match correlation_id {
            Some(correlation_id) => self.settle(correlation_id, result),
            None => result.map(|_| ()).map_err(SyncError::Remote),
        }
    }

    /// Flips the checked flag. The new value is computed from the local copy
    /// and written as a definite boolean; concurrent writers resolve by last
    /// write wins. Returns the new value.
    pub async fn toggle_check(&self, id: &str) -> Result<bool, SyncError> {
        let (correlation_id, next) = {
            let mut st = self.state();
            let previous = st
                .find(id)
                .map(|i| i.checked)
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            let next = !previous;
            let correlation_id = st.begin(Mutation::Check {
                id: id.to_string(),
                previous,
                next,
            });
            (correlation_id, next)
        };

        let result = self
            .store
            .update(Collection::ShoppingItems, &by_id(id), patch("checked", next))
            .await;
        self.settle(correlation_id, result).map(|_| next)
    }

    /// Changes the quantity by `delta`. If the result would not be positive
    /// the item is removed instead. Returns the new quantity, or `None` when
    /// the item was removed.
    pub async fn update_quantity(&self, id: &str, delta: i64) -> Result<Option<u32>, SyncError> {
        if delta == 0 {
            return Err(SyncError::Invalid("quantity change must be non-zero".into()));
        }

        let step = {
            let mut st = self.state();
            let previous = st
                .find(id)
                .map(|i| i.quantity)
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            let next = i64::from(previous) + delta;
            if next <= 0 {
                None
            } else {
                let next = u32::try_from(next)
                    .map_err(|_| SyncError::Invalid(format!("quantity {} is too large", next)))?;
                let correlation_id = st.begin(Mutation::Quantity {
                    id: id.to_string(),
                    previous,
                    next,
                });
                Some((correlation_id, next))
            }
        };

        match step {
            None => self.remove_item(id).await.map(|_| None),
            Some((correlation_id, next)) => {
                let result = self
                    .store
                    .update(Collection::ShoppingItems, &by_id(id), patch("quantity", next))
                    .await;
                self.settle(correlation_id, result).map(|_| Some(next))
            }
        }
    }

    /// Renames an item to the trimmed `new_name`.
    pub async fn update_name(&self, id: &str, new_name: &str) -> Result<(), SyncError> {
        let name = new_name.trim();
        if name.is_empty() {
            return Err(SyncError::Invalid("item name cannot be empty".into()));
        }

        let correlation_id = {
            let mut st = self.state();
            let previous = st
                .find(id)
                .map(|i| i.name.clone())
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
            st.begin(Mutation::Rename {
                id: id.to_string(),
                previous,
                next: name.to_string(),
            })
        };

        let result = self
            .store
            .update(Collection::ShoppingItems, &by_id(id), patch("name", name))
            .await;
        self.settle(correlation_id, result)
    }

    /// Removes every checked item with one remote delete. Returns how many
    /// items were cleared.
    pub async fn clear_checked(&self) -> Result<usize, SyncError> {
        let (correlation_id, ids) = {
            let mut st = self.state();
            let checked: Vec<ShoppingItem> =
                st.items.iter().filter(|i| i.checked).cloned().collect();
            if checked.is_empty() {
                return Ok(0);
            }
            let ids: Vec<String> = checked.iter().map(|i| i.id.clone()).collect();
            (st.begin(Mutation::ClearChecked { items: checked }), ids)
        };

        let count = ids.len();
        let result = self
            .store
            .delete(Collection::ShoppingItems, &Filter::all().is_in("id", ids))
            .await;
        self.settle(correlation_id, result).map(|_| count)
    }

    /// Completes the trip: archives every item into a new history entry and
    /// empties the list. Returns the new trip id, or `None` for an empty list.
    ///
    /// The active items are only deleted once the trip record and all of its
    /// snapshots are stored. A failure before that point rolls everything
    /// back; a failure after it leaves the trip `archiving` for
    /// [`resume_archives`](Self::resume_archives) to finish.
    pub async fn clear_all(&self) -> Result<Option<String>, SyncError> {
        let (correlation_id, items) = {
            let mut st = self.state();
            if st.items.is_empty() {
                return Ok(None);
            }
            let items = st.items.clone();
            (
                st.begin(Mutation::CompleteTrip {
                    items: items.clone(),
                }),
                items,
            )
        };

        // Items already archived by an earlier attempt must not be archived twice
        let cleared = match self.sweep_archives().await {
            Ok(sweep) => sweep.cleared_ids,
            Err(e) => {
                tracing::warn!("could not finish earlier archives: {}", e);
                Vec::new()
            }
        };
        let items: Vec<ShoppingItem> = items
            .into_iter()
            .filter(|i| !cleared.contains(&i.id))
            .collect();
        if items.is_empty() {
            self.confirm(correlation_id);
            return Ok(None);
        }

        let trip = match self
            .store
            .insert(Collection::ShoppingHistory, vec![Record::new()])
            .await
            .and_then(first)
            .and_then(HistoryRecord::from_record)
        {
            Ok(trip) => trip,
            Err(e) => {
                self.fail(correlation_id, &e, true);
                return Err(SyncError::Remote(e));
            }
        };

        let snapshots = items
            .iter()
            .map(|item| HistoryItem::snapshot_record(&trip.id, item))
            .collect();
        if let Err(e) = self
            .store
            .insert(Collection::ShoppingHistoryItems, snapshots)
            .await
        {
            self.discard_trip(&trip.id).await;
            self.fail(correlation_id, &e, true);
            return Err(SyncError::Remote(e));
        }

        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        if let Err(e) = self
            .store
            .delete(Collection::ShoppingItems, &Filter::all().is_in("id", ids))
            .await
        {
            self.fail(correlation_id, &e, true);
            return Err(SyncError::ArchiveIncomplete {
                history_id: trip.id,
                source: e,
            });
        }

        if let Err(e) = self.mark_complete(&trip.id).await {
            // The list really is empty now; only the trip's status lags
            self.fail(correlation_id, &e, false);
            return Err(SyncError::ArchiveIncomplete {
                history_id: trip.id,
                source: e,
            });
        }

        self.confirm(correlation_id);
        tracing::debug!("archived {} item(s) into trip {}", items.len(), trip.id);
        Ok(Some(trip.id))
    }

    /// Finishes trips left `archiving` by an interrupted [`clear_all`](Self::clear_all).
    ///
    /// Safe to run at any time and from any client.
    pub async fn resume_archives(&self) -> Result<ArchiveSweep, SyncError> {
        Ok(self.sweep_archives().await?)
    }

    async fn sweep_archives(&self) -> Result<ArchiveSweep, StoreError> {
        let open = self
            .store
            .select(
                Collection::ShoppingHistory,
                &Query::new()
                    .filter(Filter::all().eq("status", ArchiveStatus::Archiving.as_str()))
                    .order_by("completed_at", true),
            )
            .await?;

        let mut sweep = ArchiveSweep::default();
        for record in open {
            let trip = HistoryRecord::from_record(record)?;
            let snapshots = self
                .store
                .select(
                    Collection::ShoppingHistoryItems,
                    &Query::new().filter(Filter::all().eq("history_id", trip.id.as_str())),
                )
                .await?;

            if snapshots.is_empty() {
                let age = Utc::now() - trip.completed_at;
                if age > Duration::seconds(ABANDONED_ARCHIVE_GRACE_SECS) {
                    self.store
                        .delete(Collection::ShoppingHistory, &by_id(&trip.id))
                        .await?;
                    sweep.discarded.push(trip.id);
                }
                continue;
            }

            let ids: Vec<String> = snapshots
                .iter()
                .filter_map(|s| s.get("source_item_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            if !ids.is_empty() {
                self.store
                    .delete(
                        Collection::ShoppingItems,
                        &Filter::all().is_in("id", ids.iter().map(String::as_str)),
                    )
                    .await?;
            }
            self.mark_complete(&trip.id).await?;
            tracing::info!("finished archiving trip {}", trip.id);
            sweep.completed.push(trip.id);
            sweep.cleared_ids.extend(ids);
        }

        if !sweep.cleared_ids.is_empty() {
            let mut st = self.state();
            st.items.retain(|i| !sweep.cleared_ids.contains(&i.id));
        }
        Ok(sweep)
    }

    async fn mark_complete(&self, history_id: &str) -> Result<u64, StoreError> {
        self.store
            .update(
                Collection::ShoppingHistory,
                &by_id(history_id),
                patch("status", ArchiveStatus::Complete.as_str()),
            )
            .await
    }

    /// Compensates a trip whose snapshots could not be stored.
    async fn discard_trip(&self, history_id: &str) {
        if let Err(e) = self
            .store
            .delete(Collection::ShoppingHistory, &by_id(history_id))
            .await
        {
            tracing::warn!(
                "could not discard trip {}; the archive sweep will retry: {}",
                history_id,
                e
            );
        }
    }
}

impl<S: RemoteStore + ?Sized + 'static> ListSyncManager<S> {
    /// Subscribes to `shopping_items` changes and reloads on each batch of
    /// notifications, including echoes of this manager's own writes.
    pub async fn spawn_reconciler(&self) -> Result<ReconcileHandle, SyncError> {
        let mut feed = self.store.subscribe(Collection::ShoppingItems).await?;
        let manager = self.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = feed.recv().await {
                let mut batched = 1;
                while feed.try_recv().is_some() {
                    batched += 1;
                }
                tracing::debug!(
                    "{:?} on {} ({} notification(s)), reloading",
                    event.kind,
                    event.collection,
                    batched
                );
                if let Err(e) = manager.load().await {
                    tracing::warn!("reload after change notification failed: {}", e);
                }
            }
            tracing::debug!("shopping_items change feed closed");
        });

        Ok(ReconcileHandle::new(task))
    }

    /// Subscribes, then performs the initial load.
    pub async fn start(&self) -> Result<ReconcileHandle, SyncError> {
        let handle = self.spawn_reconciler().await?;
        self.load().await?;
        Ok(handle)
    }
}
