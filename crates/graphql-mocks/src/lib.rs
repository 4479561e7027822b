//! Mock GraphQL servers speaking GraphQL over websockets, for testing subscription clients

use std::sync::Arc;

use axum::Router;
use crossbeam_queue::SegQueue;
use url::Url;

mod schema;
mod scripted;
mod websockets;

pub use {
    schema::{CounterSchema, CounterSubscription, Query},
    scripted::{MockSocket, ScriptedServer},
    websockets::ConnectionInitPayload,
};

/// Serves [`CounterSchema`] on `/ws` with async-graphql, which supports both the
/// `graphql-ws` and `graphql-transport-ws` subprotocols.
pub struct MockGraphQlServer {
    handle: MockServerHandle,
    init_payloads: Arc<SegQueue<serde_json::Value>>,
}

impl MockGraphQlServer {
    pub async fn new(schema: CounterSchema) -> MockGraphQlServer {
        Self::new_impl(schema, None).await
    }

    /// Only acknowledges connections whose init payload carries `{"token": token}`.
    pub async fn with_required_token(schema: CounterSchema, token: impl Into<String>) -> MockGraphQlServer {
        Self::new_impl(schema, Some(token.into())).await
    }

    async fn new_impl(schema: CounterSchema, required_token: Option<String>) -> Self {
        let init_payloads = Arc::new(SegQueue::new());
        let app = Router::new().route_service(
            "/ws",
            websockets::SubscriptionService::new(schema, required_token, init_payloads.clone()),
        );

        MockGraphQlServer {
            handle: MockServerHandle::serve(app).await,
            init_payloads,
        }
    }

    pub fn websocket_url(&self) -> Url {
        self.handle.url("ws", "/ws")
    }

    pub fn drain_init_payloads(&self) -> Vec<serde_json::Value> {
        let mut payloads = Vec::new();
        while let Some(payload) = self.init_payloads.pop() {
            payloads.push(payload);
        }
        payloads
    }
}

/// An axum app listening on a random local port until dropped.
struct MockServerHandle {
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    port: u16,
}

impl Drop for MockServerHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.send(()).ok();
        }
    }
}

impl MockServerHandle {
    async fn serve(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (shutdown_sender, shutdown_receiver) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_receiver.await.ok();
                })
                .await
                .unwrap();
        });

        MockServerHandle {
            shutdown: Some(shutdown_sender),
            port,
        }
    }

    fn url(&self, scheme: &str, path: &str) -> Url {
        format!("{scheme}://127.0.0.1:{}{path}", self.port).parse().unwrap()
    }
}
