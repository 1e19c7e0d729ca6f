//! Change notifications.
//!
//! Stores publish one `ChangeEvent` per write statement that touched at least
//! one row. Consumers hold a `ChangeFeed` scoped to a single collection;
//! dropping the feed releases the subscription.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::Collection;

/// Buffered events per collection before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(collection: Collection, kind: ChangeKind) -> Self {
        Self { collection, kind }
    }
}

/// Subscription to the changes of one collection.
pub struct ChangeFeed {
    collection: Collection,
    rx: broadcast::Receiver<ChangeEvent>,
    /// Task feeding `rx` from a remote connection, if any
    pump: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    pub fn new(collection: Collection, rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self {
            collection,
            rx,
            pump: None,
        }
    }

    /// Ties a background task to the feed; it is aborted when the feed drops.
    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        self.pump = Some(pump);
        self
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Waits for the next event. Returns `None` once the source has closed.
    ///
    /// If events were dropped because this subscriber fell behind, a
    /// synthetic update event is returned so the consumer still refetches.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.collection == self.collection => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!("{} feed lagged, {} event(s) dropped", self.collection, missed);
                    return Some(ChangeEvent::new(self.collection, ChangeKind::Update));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.collection == self.collection => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => {
                    return Some(ChangeEvent::new(self.collection, ChangeKind::Update))
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("collection", &self.collection)
            .field("pumped", &self.pump.is_some())
            .finish()
    }
}

/// Fans change events out to every subscriber of a collection.
pub struct ChangeHub {
    channels: RwLock<HashMap<Collection, broadcast::Sender<ChangeEvent>>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to changes of `collection`.
    pub async fn subscribe(&self, collection: Collection) -> ChangeFeed {
        let mut channels = self.channels.write().await;
        let sender = channels
            .entry(collection)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        ChangeFeed::new(collection, sender.subscribe())
    }

    /// Publishes an event to all current subscribers of its collection.
    pub async fn publish(&self, event: ChangeEvent) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(&event.collection) {
            // No subscribers is fine
            let _ = sender.send(event);
        }
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hub_subscribe_and_publish() {
        let hub = ChangeHub::new();
        let mut feed = hub.subscribe(Collection::ShoppingItems).await;

        hub.publish(ChangeEvent::new(Collection::ShoppingItems, ChangeKind::Insert))
            .await;

        let event = feed.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
    }

    #[tokio::test]
    async fn test_hub_isolates_collections() {
        let hub = ChangeHub::new();
        let mut items = hub.subscribe(Collection::ShoppingItems).await;
        let mut history = hub.subscribe(Collection::ShoppingHistory).await;

        hub.publish(ChangeEvent::new(Collection::ShoppingHistory, ChangeKind::Insert))
            .await;

        assert!(items.try_recv().is_none());
        assert!(history.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_lagged_feed_yields_synthetic_event() {
        let hub = ChangeHub::new();
        let mut feed = hub.subscribe(Collection::ShoppingItems).await;

        for _ in 0..CHANNEL_CAPACITY + 5 {
            hub.publish(ChangeEvent::new(Collection::ShoppingItems, ChangeKind::Delete))
                .await;
        }

        let event = feed.recv().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Update);
    }

    #[tokio::test]
    async fn test_closed_feed_returns_none() {
        let (tx, rx) = broadcast::channel(4);
        let mut feed = ChangeFeed::new(Collection::ShoppingItems, rx);
        drop(tx);
        assert!(feed.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_aborts_pump() {
        let (_tx, rx) = broadcast::channel::<ChangeEvent>(4);
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let pump = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await
        });

        let feed = ChangeFeed::new(Collection::ShoppingItems, rx).with_pump(pump);
        drop(feed);

        // The sender is dropped only when the pump task is torn down
        assert!(alive_rx.await.is_err());
    }
}
