use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::dedup::dedup_products;
use crate::models::{
    ArchiveStatus, HistoryEntry, HistoryItem, HistoryProduct, HistoryRecord, ShoppingItem,
};
use crate::store::{
    blob_name_from_url, BlobStore, Collection, Filter, Query, RemoteStore, StoreError,
};
use crate::sync::{CascadeStage, ListSyncManager, SyncError};

/// Everything `remove_product` will touch, worked out before anything is
/// deleted. `stage` is the next stage to run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadePlan {
    pub name: String,
    pub stage: CascadeStage,
    /// Trips that held a snapshot of the product
    pub trip_ids: Vec<String>,
    /// Image URLs the removed snapshots referenced
    pub image_urls: Vec<String>,
}

/// What a completed cascade removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeReport {
    pub snapshots: u64,
    pub images: Vec<String>,
    pub trips: Vec<String>,
}

/// Read side of the archive, plus re-adding and product removal.
pub struct HistoryView<S: ?Sized, B: ?Sized> {
    manager: ListSyncManager<S>,
    blobs: Arc<B>,
}

impl<S: RemoteStore + ?Sized, B: BlobStore + ?Sized> HistoryView<S, B> {
    pub fn new(manager: ListSyncManager<S>, blobs: Arc<B>) -> Self {
        Self { manager, blobs }
    }

    pub fn manager(&self) -> &ListSyncManager<S> {
        &self.manager
    }

    fn store(&self) -> &S {
        self.manager.store()
    }

    /// Finished trips newest first, each with its snapshots in archive order.
    ///
    /// Trips still `archiving` are left out: their items may still be on the
    /// active list until the archive sweep completes them.
    pub async fn entries(&self) -> Result<Vec<HistoryEntry>, SyncError> {
        let records = self
            .store()
            .select(
                Collection::ShoppingHistory,
                &Query::new()
                    .filter(Filter::all().eq("status", ArchiveStatus::Complete.as_str()))
                    .order_by("completed_at", false),
            )
            .await?
            .into_iter()
            .map(HistoryRecord::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        let items = self
            .store()
            .select(
                Collection::ShoppingHistoryItems,
                &Query::new().order_by("created_at", true),
            )
            .await?
            .into_iter()
            .map(HistoryItem::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("fetched {} trip(s), {} snapshot(s)", records.len(), items.len());
        Ok(HistoryEntry::assemble(records, items))
    }

    /// One product per name, most recently used first.
    pub async fn products(&self) -> Result<Vec<HistoryProduct>, SyncError> {
        Ok(dedup_products(&self.entries().await?))
    }

    /// Puts snapshots back on the active list with a single insert.
    pub async fn add_to_list<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a HistoryItem>,
    ) -> Result<Vec<ShoppingItem>, SyncError> {
        let items = snapshots.into_iter().map(HistoryItem::to_new_item).collect();
        self.manager.add_items(items).await
    }

    /// Deletes every snapshot named `name`, then any image no longer
    /// referenced, then any finished trip left without snapshots.
    ///
    /// On failure the returned [`SyncError::CascadeIncomplete`] carries the
    /// plan; pass it to [`resume_removal`](Self::resume_removal) to continue.
    pub async fn remove_product(&self, name: &str) -> Result<CascadeReport, SyncError> {
        let plan = self.plan_removal(name).await?;
        self.resume_removal(plan).await
    }

    async fn plan_removal(&self, name: &str) -> Result<CascadePlan, SyncError> {
        let snapshots = self
            .store()
            .select(
                Collection::ShoppingHistoryItems,
                &Query::new().filter(Filter::all().eq("name", name)),
            )
            .await?
            .into_iter()
            .map(HistoryItem::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        let trip_ids: BTreeSet<String> = snapshots.iter().map(|s| s.history_id.clone()).collect();
        let image_urls: BTreeSet<String> =
            snapshots.iter().filter_map(|s| s.image_url.clone()).collect();

        Ok(CascadePlan {
            name: name.to_string(),
            stage: CascadeStage::Snapshots,
            trip_ids: trip_ids.into_iter().collect(),
            image_urls: image_urls.into_iter().collect(),
        })
    }

    /// Runs `plan` from its current stage. Every stage can be repeated.
    pub async fn resume_removal(&self, mut plan: CascadePlan) -> Result<CascadeReport, SyncError> {
        let mut report = CascadeReport::default();
        loop {
            match plan.stage {
                CascadeStage::Snapshots => {
                    let filter = Filter::all().eq("name", plan.name.as_str());
                    match self
                        .store()
                        .delete(Collection::ShoppingHistoryItems, &filter)
                        .await
                    {
                        Ok(deleted) => report.snapshots = deleted,
                        Err(e) => return Err(incomplete(plan, e)),
                    }
                    plan.stage = CascadeStage::Images;
                }
                CascadeStage::Images => {
                    match self.remove_unreferenced_images(&plan.image_urls).await {
                        Ok(names) => report.images = names,
                        Err(e) => return Err(incomplete(plan, e)),
                    }
                    plan.stage = CascadeStage::Trips;
                }
                CascadeStage::Trips => {
                    match self.delete_empty_trips(&plan.trip_ids).await {
                        Ok(ids) => report.trips = ids,
                        Err(e) => return Err(incomplete(plan, e)),
                    }
                    tracing::debug!(
                        "removed '{}': {} snapshot(s), {} image(s), {} trip(s)",
                        plan.name,
                        report.snapshots,
                        report.images.len(),
                        report.trips.len()
                    );
                    return Ok(report);
                }
            }
        }
    }

    async fn remove_unreferenced_images(&self, urls: &[String]) -> Result<Vec<String>, SyncError> {
        let mut orphaned = Vec::new();
        for url in urls {
            let filter = Filter::all().eq("image_url", url.as_str());
            if self
                .store()
                .count(Collection::ShoppingHistoryItems, &filter)
                .await?
                > 0
            {
                continue;
            }
            if self.store().count(Collection::ShoppingItems, &filter).await? > 0 {
                continue;
            }
            match blob_name_from_url(url) {
                Some(name) => orphaned.push(name.to_string()),
                None => tracing::warn!("cannot derive a blob name from {}", url),
            }
        }
        if !orphaned.is_empty() {
            self.blobs.remove(&orphaned).await?;
        }
        Ok(orphaned)
    }

    async fn delete_empty_trips(&self, trip_ids: &[String]) -> Result<Vec<String>, StoreError> {
        if trip_ids.is_empty() {
            return Ok(Vec::new());
        }
        // Trips still archiving belong to the archive sweep
        let complete = self
            .store()
            .select(
                Collection::ShoppingHistory,
                &Query::new().filter(
                    Filter::all()
                        .is_in("id", trip_ids.iter().map(String::as_str))
                        .eq("status", ArchiveStatus::Complete.as_str()),
                ),
            )
            .await?;

        let mut empty = Vec::new();
        for record in complete {
            let trip = HistoryRecord::from_record(record)?;
            let remaining = self
                .store()
                .count(
                    Collection::ShoppingHistoryItems,
                    &Filter::all().eq("history_id", trip.id.as_str()),
                )
                .await?;
            if remaining == 0 {
                empty.push(trip.id);
            }
        }

        if !empty.is_empty() {
            self.store()
                .delete(
                    Collection::ShoppingHistory,
                    &Filter::all().is_in("id", empty.iter().map(String::as_str)),
                )
                .await?;
        }
        Ok(empty)
    }

    /// Deletes every finished trip that has no snapshots left.
    pub async fn sweep_empty_trips(&self) -> Result<Vec<String>, SyncError> {
        let ids: Vec<String> = self
            .store()
            .select(
                Collection::ShoppingHistory,
                &Query::new().filter(Filter::all().eq("status", ArchiveStatus::Complete.as_str())),
            )
            .await?
            .into_iter()
            .map(HistoryRecord::from_record)
            .map(|r| r.map(|r| r.id))
            .collect::<Result<_, _>>()?;
        let removed = self.delete_empty_trips(&ids).await?;
        if !removed.is_empty() {
            tracing::info!("swept {} empty trip(s)", removed.len());
        }
        Ok(removed)
    }
}

fn incomplete(plan: CascadePlan, error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> SyncError {
    SyncError::CascadeIncomplete {
        name: plan.name.clone(),
        stage: plan.stage,
        source: error.into(),
        plan: Box::new(plan),
    }
}
