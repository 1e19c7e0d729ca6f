//! HTTP client for the Shoplist server.
//!
//! Implements the store traits over the server's REST endpoints and the
//! `/realtime/{collection}` WebSocket feed.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use shoplist_core::store::{
    validate_blob_name, BlobError, BlobStore, ChangeEvent, ChangeFeed, Collection, Filter, Query,
    Record, RemoteStore, StoreError,
};

/// Events buffered between the socket and the feed.
const FEED_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Affected {
    affected: u64,
}

#[derive(Debug, Deserialize)]
struct Count {
    count: u64,
}

#[derive(Debug, Serialize)]
struct FilterBody<'a> {
    filter: &'a Filter,
}

/// Remote store and blob store backed by a Shoplist server.
#[derive(Debug, Clone)]
pub struct HttpStore {
    server_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl HttpStore {
    pub fn new(server_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key,
            http: reqwest::Client::new(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Builds an HTTP URL for a given path.
    fn build_http_url(&self, path: &str) -> String {
        let base_url = if self.server_url.starts_with("ws://") {
            self.server_url.replacen("ws://", "http://", 1)
        } else if self.server_url.starts_with("wss://") {
            self.server_url.replacen("wss://", "https://", 1)
        } else if !self.server_url.starts_with("http://")
            && !self.server_url.starts_with("https://")
        {
            format!("http://{}", self.server_url)
        } else {
            self.server_url.clone()
        };

        format!("{}{}", base_url.trim_end_matches('/'), path)
    }

    /// Builds the change feed URL for a collection. The key travels as a
    /// query parameter since browsers cannot set headers on upgrades.
    fn build_ws_url(&self, collection: Collection) -> String {
        let http_url = self.build_http_url(&format!("/realtime/{}", collection.name()));
        let mut url = if let Some(rest) = http_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = http_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            http_url
        };
        if let Some(key) = &self.api_key {
            url.push_str("?key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, self.build_http_url(path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Maps an unsuccessful response to a store error.
fn status_error(status: reqwest::StatusCode, body: &str) -> StoreError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message.unwrap_or(parsed.error),
        Err(_) => body.trim().to_string(),
    };
    let message = if message.is_empty() {
        format!("Server returned status {}", status)
    } else {
        message
    };

    match status.as_u16() {
        404 => StoreError::NotFound,
        400 | 409 | 422 => StoreError::Constraint(message),
        401 | 403 => StoreError::Transport(format!("Unauthorized: {}", message)),
        _ => StoreError::Backend(message),
    }
}

fn blob_error(name: &str, err: StoreError) -> BlobError {
    match err {
        StoreError::NotFound => BlobError::NotFound(name.to_string()),
        StoreError::Constraint(_) => BlobError::InvalidName(name.to_string()),
        other => BlobError::Transport(other.to_string()),
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn select(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<Record>, StoreError> {
        let path = format!("/rest/{}/select", collection.name());
        self.send_json(self.request(reqwest::Method::POST, &path).json(query))
            .await
    }

    async fn insert(
        &self,
        collection: Collection,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        let path = format!("/rest/{}", collection.name());
        self.send_json(self.request(reqwest::Method::POST, &path).json(&records))
            .await
    }

    async fn update(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: Record,
    ) -> Result<u64, StoreError> {
        let path = format!("/rest/{}", collection.name());
        let body = json!({ "filter": filter, "patch": patch });
        let affected: Affected = self
            .send_json(self.request(reqwest::Method::PATCH, &path).json(&body))
            .await?;
        Ok(affected.affected)
    }

    async fn delete(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let path = format!("/rest/{}/delete", collection.name());
        let affected: Affected = self
            .send_json(
                self.request(reqwest::Method::POST, &path)
                    .json(&FilterBody { filter }),
            )
            .await?;
        Ok(affected.affected)
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let path = format!("/rest/{}/count", collection.name());
        let count: Count = self
            .send_json(
                self.request(reqwest::Method::POST, &path)
                    .json(&FilterBody { filter }),
            )
            .await?;
        Ok(count.count)
    }

    async fn subscribe(&self, collection: Collection) -> Result<ChangeFeed, StoreError> {
        let ws_url = self.build_ws_url(collection);
        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        tracing::debug!("subscribed to {} changes", collection);

        let (tx, rx) = broadcast::channel(FEED_CAPACITY);
        let pump = tokio::spawn(async move {
            let (mut sender, mut receiver) = ws_stream.split();
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ChangeEvent>(text.as_str()) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::debug!("ignoring malformed change event: {}", e),
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("change feed for {} closed: {}", collection, e);
                        break;
                    }
                }
            }
        });

        Ok(ChangeFeed::new(collection, rx).with_pump(pump))
    }
}

#[async_trait]
impl BlobStore for HttpStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<(), BlobError> {
        validate_blob_name(name)?;
        let mut builder = self
            .request(reqwest::Method::PUT, &format!("/storage/{}", name))
            .body(bytes);
        if let Some(content_type) = content_type {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }
        let _: serde_json::Value = self
            .send_json(builder)
            .await
            .map_err(|e| blob_error(name, e))?;
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        self.build_http_url(&format!("/storage/{}", name))
    }

    async fn remove(&self, names: &[String]) -> Result<(), BlobError> {
        if names.is_empty() {
            return Ok(());
        }
        let response = self
            .request(reqwest::Method::POST, "/storage/remove")
            .json(&json!({ "names": names }))
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let name = names.join(", ");
            return Err(blob_error(&name, status_error(status, &body)));
        }
        Ok(())
    }
}
