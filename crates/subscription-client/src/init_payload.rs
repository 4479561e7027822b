use std::{future::Future, sync::Arc};

use futures_util::future::BoxFuture;

use crate::Error;

type Producer = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync>;

/// The payload of the `connection_init` message.
#[derive(Clone, Default)]
pub enum InitPayload {
    #[default]
    None,
    Static(serde_json::Value),
    /// Evaluated once per connection attempt, right before `connection_init` is sent.
    Producer(Producer),
}

impl InitPayload {
    pub fn producer<F, Fut>(producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        InitPayload::Producer(Arc::new(move || Box::pin(producer())))
    }

    pub(crate) async fn resolve(&self) -> Result<Option<serde_json::Value>, Error> {
        match self {
            InitPayload::None => Ok(None),
            InitPayload::Static(payload) => Ok(Some(payload.clone())),
            InitPayload::Producer(producer) => producer()
                .await
                .map(Some)
                .map_err(|error| Error::InitPayload(format!("{error:#}"))),
        }
    }
}

impl From<serde_json::Value> for InitPayload {
    fn from(payload: serde_json::Value) -> Self {
        InitPayload::Static(payload)
    }
}

impl std::fmt::Debug for InitPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitPayload::None => f.write_str("None"),
            InitPayload::Static(payload) => f.debug_tuple("Static").field(payload).finish(),
            InitPayload::Producer(_) => f.debug_tuple("Producer").finish_non_exhaustive(),
        }
    }
}
