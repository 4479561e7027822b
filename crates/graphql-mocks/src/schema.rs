use std::time::Duration;

use async_graphql::{Context, EmptyMutation, Object, Subscription};
use axum::http::HeaderMap;
use futures::{stream, Stream};

use crate::websockets::ConnectionInitPayload;

/// A schema with a few subscriptions that behave predictably.
#[derive(Clone)]
pub struct CounterSchema {
    schema: async_graphql::Schema<Query, EmptyMutation, CounterSubscription>,
}

impl CounterSchema {
    pub(crate) fn into_inner(self) -> async_graphql::Schema<Query, EmptyMutation, CounterSubscription> {
        self.schema
    }
}

impl Default for CounterSchema {
    fn default() -> Self {
        CounterSchema {
            schema: async_graphql::Schema::build(Query, EmptyMutation, CounterSubscription).finish(),
        }
    }
}

#[derive(Default)]
pub struct Query;

#[Object]
impl Query {
    async fn hello(&self) -> &'static str {
        "world"
    }
}

#[derive(Default)]
pub struct CounterSubscription;

#[Subscription]
impl CounterSubscription {
    /// Counts from `start` and completes after `count` values.
    async fn on_x(&self, #[graphql(default = 1)] start: i32, #[graphql(default = 1)] count: i32) -> impl Stream<Item = i32> {
        stream::iter(start..start.saturating_add(count))
    }

    /// Counts up forever, one value every `interval_ms`.
    async fn ticks(&self, #[graphql(default = 10)] interval_ms: i32) -> impl Stream<Item = i32> {
        let interval = Duration::from_millis(u64::try_from(interval_ms).unwrap_or(10));

        stream::unfold(0, move |tick| async move {
            tokio::time::sleep(interval).await;
            Some((tick, tick + 1))
        })
    }

    /// Emits the `token` the connection was initialised with.
    async fn token(&self, ctx: &Context<'_>) -> impl Stream<Item = Option<String>> {
        let token = ctx
            .data_opt::<ConnectionInitPayload>()
            .and_then(|ConnectionInitPayload(payload)| payload.get("token"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        stream::once(async move { token })
    }

    /// Emits the value of a header from the websocket upgrade request.
    async fn header(&self, ctx: &Context<'_>, name: String) -> impl Stream<Item = Option<String>> {
        let value = ctx
            .data_opt::<HeaderMap>()
            .and_then(|headers| headers.get(name.as_str()))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        stream::once(async move { value })
    }
}
