//! A websocket server whose side of the conversation is written by the test.

use std::{future::Future, sync::Arc};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        WebSocketUpgrade,
    },
    http::HeaderMap,
    routing::get,
    Router,
};
use crossbeam_queue::SegQueue;
use serde_json::json;
use url::Url;

use crate::MockServerHandle;

/// Runs `script` for every websocket connection made to it.
pub struct ScriptedServer {
    handle: MockServerHandle,
    received_messages: Arc<SegQueue<serde_json::Value>>,
    upgrade_headers: Arc<SegQueue<HeaderMap>>,
}

impl ScriptedServer {
    pub async fn start<F, Fut>(script: F) -> ScriptedServer
    where
        F: Fn(MockSocket) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let received_messages = Arc::new(SegQueue::new());
        let upgrade_headers = Arc::new(SegQueue::new());

        let app = Router::new().route("/ws", {
            let received_messages = received_messages.clone();
            let upgrade_headers = upgrade_headers.clone();

            get(move |headers: HeaderMap, upgrade: WebSocketUpgrade| async move {
                upgrade_headers.push(headers);

                upgrade.protocols(["graphql-ws"]).on_upgrade(move |socket| {
                    script(MockSocket {
                        socket,
                        received_messages,
                    })
                })
            })
        });

        ScriptedServer {
            handle: MockServerHandle::serve(app).await,
            received_messages,
            upgrade_headers,
        }
    }

    pub fn websocket_url(&self) -> Url {
        self.handle.url("ws", "/ws")
    }

    /// The headers of every websocket upgrade request so far, oldest first.
    pub fn drain_upgrade_headers(&self) -> Vec<HeaderMap> {
        let mut headers = Vec::new();
        while let Some(request_headers) = self.upgrade_headers.pop() {
            headers.push(request_headers);
        }
        headers
    }

    /// Every JSON message the server received so far, oldest first.
    pub fn drain_received_messages(&self) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        while let Some(message) = self.received_messages.pop() {
            messages.push(message);
        }
        messages
    }
}

/// The server end of one websocket connection.
pub struct MockSocket {
    socket: WebSocket,
    received_messages: Arc<SegQueue<serde_json::Value>>,
}

impl MockSocket {
    /// The next JSON message from the client, `None` once the client is gone.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        while let Some(message) = self.socket.recv().await {
            let message: serde_json::Value = match message {
                Ok(Message::Text(text)) => serde_json::from_str(&text).ok()?,
                Ok(Message::Binary(bytes)) => serde_json::from_slice(&bytes).ok()?,
                Ok(Message::Ping(_) | Message::Pong(_)) => continue,
                Ok(Message::Close(_)) | Err(_) => return None,
            };

            self.received_messages.push(message.clone());
            return Some(message);
        }

        None
    }

    /// Waits for `connection_init`, acknowledges it and returns its payload.
    pub async fn accept(&mut self) -> Option<serde_json::Value> {
        let init = self.recv().await?;
        assert_eq!(init["type"], "connection_init", "unexpected message {init}");

        self.send(json!({"type": "connection_ack"})).await;
        Some(init.get("payload").cloned().unwrap_or_default())
    }

    pub async fn send(&mut self, message: serde_json::Value) {
        self.send_text(message.to_string()).await;
    }

    /// Sends a raw text frame, it doesn't have to be valid JSON.
    pub async fn send_text(&mut self, text: impl Into<String>) {
        self.socket.send(Message::Text(text.into())).await.ok();
    }

    /// Keeps the connection open, swallowing messages, until the client goes away.
    pub async fn wait_for_close(&mut self) {
        while self.recv().await.is_some() {}
    }

    pub async fn close(mut self) {
        self.socket.send(Message::Close(None)).await.ok();
    }
}
