//! Change feed over WebSocket.
//!
//! Each `ChangeEvent` for the subscribed collection is pushed as a JSON text
//! frame. The connection carries no other application messages.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use shoplist_core::store::{ChangeFeed, Collection, RemoteStore};

use super::error::ApiError;
use super::AppState;

pub async fn realtime(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Response, ApiError> {
    let collection = Collection::parse(&collection)?;
    // Subscribe before upgrading so no write between the two is missed
    let feed = state.store.subscribe(collection).await?;
    Ok(ws.on_upgrade(move |socket| stream_changes(socket, feed)))
}

async fn stream_changes(socket: WebSocket, mut feed: ChangeFeed) {
    let collection = feed.collection();
    tracing::info!("realtime subscriber connected to {}", collection);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = feed.recv() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("failed to encode change event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("realtime subscriber left {}", collection);
}
