//! Connection to a Shoplist server.

mod client;

pub use client::HttpStore;

use std::sync::Arc;

use shoplist_core::{HistoryView, ListSyncManager};

use crate::config::{Config, ConfigError};

/// The list manager and history view for one CLI invocation, sharing a
/// single HTTP client.
pub struct Session {
    pub store: Arc<HttpStore>,
    pub history: HistoryView<HttpStore, HttpStore>,
}

impl Session {
    pub fn connect(config: &Config) -> Result<Self, ConfigError> {
        let server_url = config.require_server_url()?;
        let store = Arc::new(HttpStore::new(
            server_url,
            config.api_key().map(str::to_string),
        ));
        let manager =
            ListSyncManager::new(Arc::clone(&store)).with_default_unit(&config.default_unit.value);
        let history = HistoryView::new(manager, Arc::clone(&store));
        Ok(Self { store, history })
    }

    pub fn manager(&self) -> &ListSyncManager<HttpStore> {
        self.history.manager()
    }
}
