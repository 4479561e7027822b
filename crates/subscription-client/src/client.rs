use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use async_tungstenite::tungstenite::{
    client::IntoClientRequest,
    handshake::client::Request,
    http::{header, HeaderName, HeaderValue},
};
use futures_util::Stream;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot, watch,
};
use url::Url;

use crate::{
    connection::{Command, Connection, DisconnectCallback, WebsocketConnection},
    registry::{Subscriber, SubscriptionId},
    ClientConfig, ConnectionState, Error, InitPayload, SubscriptionEvent, SubscriptionRequest,
};

const COMMAND_BUFFER: usize = 16;

type ConnectedCallback = Box<dyn FnOnce() + Send>;
type FailedCallback = Box<dyn FnOnce(&Error) + Send>;

/// Configures a [`SubscriptionClient`] before the connection is opened.
#[must_use]
pub struct ClientBuilder {
    config: ClientConfig,
    init_payload: InitPayload,
    on_connected: Option<ConnectedCallback>,
    on_connection_failed: Option<FailedCallback>,
    on_disconnected: Option<DisconnectCallback>,
}

impl ClientBuilder {
    fn new(config: ClientConfig) -> Self {
        let init_payload = config.init_payload.clone().map(InitPayload::Static).unwrap_or_default();

        ClientBuilder {
            config,
            init_payload,
            on_connected: None,
            on_connection_failed: None,
            on_disconnected: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.protocol = protocol.into();
        self
    }

    pub fn init_payload(mut self, payload: impl Into<InitPayload>) -> Self {
        self.init_payload = payload.into();
        self
    }

    /// Computes the `connection_init` payload when the connection is opened, for tokens
    /// that have to be fetched or refreshed first.
    pub fn init_payload_with<F, Fut>(mut self, producer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        self.init_payload = InitPayload::producer(producer);
        self
    }

    /// Called once the server acknowledged the connection.
    pub fn on_connected(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_connected = Some(Box::new(callback));
        self
    }

    /// Called if the connection never becomes ready. Never called together with `on_connected`.
    pub fn on_connection_failed(mut self, callback: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.on_connection_failed = Some(Box::new(callback));
        self
    }

    /// Called if a ready connection is lost without [`SubscriptionClient::close`] being called.
    pub fn on_disconnected(mut self, callback: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.on_disconnected = Some(Box::new(callback));
        self
    }

    /// Opens the websocket and performs the handshake.
    pub async fn connect(self) -> Result<SubscriptionClient, Error> {
        let (state, _) = watch::channel(ConnectionState::Connecting);

        let connected = match self.client_request() {
            Ok(request) => {
                tracing::debug!(url = %self.config.url, "opening websocket connection");
                async_tungstenite::tokio::connect_async(request)
                    .await
                    .map_err(Error::Connect)
            }
            Err(error) => Err(error),
        };

        match connected {
            Ok((socket, _)) => self.start(socket, state).await,
            Err(error) => {
                state.send_replace(ConnectionState::Failed);
                Err(self.connection_failed(error))
            }
        }
    }

    /// Runs the protocol on an already opened websocket.
    pub async fn build<S: WebsocketConnection>(self, socket: S) -> Result<SubscriptionClient, Error> {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        self.start(socket, state).await
    }

    fn client_request(&self) -> Result<Request, Error> {
        let mut request = self.config.url.as_str().into_client_request().map_err(Error::Connect)?;

        for (name, value) in &self.config.headers {
            let name = HeaderName::try_from(name.as_str()).map_err(|_| Error::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::try_from(value.as_str()).map_err(|_| Error::InvalidHeader(name.as_str().to_string()))?;
            request.headers_mut().insert(name, value);
        }

        let protocol = HeaderValue::try_from(self.config.protocol.as_str())
            .map_err(|_| Error::InvalidHeader(header::SEC_WEBSOCKET_PROTOCOL.as_str().to_string()))?;
        request.headers_mut().insert(header::SEC_WEBSOCKET_PROTOCOL, protocol);

        Ok(request)
    }

    async fn start<S: WebsocketConnection>(
        mut self,
        socket: S,
        state: watch::Sender<ConnectionState>,
    ) -> Result<SubscriptionClient, Error> {
        let state_receiver = state.subscribe();

        let connection = match Connection::handshake(socket, &self.init_payload, state).await {
            Ok(connection) => connection,
            Err(error) => {
                tracing::warn!("connection handshake failed: {error}");
                return Err(self.connection_failed(error));
            }
        };

        // on_connected runs before the connection task can report a disconnect.
        if let Some(callback) = self.on_connected.take() {
            callback();
        }

        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(connection.on_disconnected(self.on_disconnected.take()).run(receiver));

        Ok(SubscriptionClient {
            commands,
            state: state_receiver,
        })
    }

    fn connection_failed(mut self, error: Error) -> Error {
        if let Some(callback) = self.on_connection_failed.take() {
            callback(&error);
        }
        error
    }
}

/// A graphql-ws client multiplexing many subscriptions over a single websocket.
///
/// Obtained through [`SubscriptionClient::builder`], only once the server acknowledged
/// the connection.
#[derive(Clone)]
pub struct SubscriptionClient {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for SubscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SubscriptionClient {
    pub fn builder(url: Url) -> ClientBuilder {
        ClientBuilder::new(ClientConfig::new(url))
    }

    pub fn from_config(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Starts a subscription, `on_event` is called for every `data` and `error` message
    /// of this subscription until it completes, fails, or is unsubscribed.
    pub async fn create_subscription<F>(
        &self,
        query: impl Into<String>,
        variables: impl serde::Serialize,
        on_event: F,
    ) -> Result<Subscription, Error>
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        let request = SubscriptionRequest::new(query).variables(variables)?;
        self.create_subscription_with(request, on_event).await
    }

    pub async fn create_subscription_with<F>(
        &self,
        request: impl Into<SubscriptionRequest>,
        on_event: F,
    ) -> Result<Subscription, Error>
    where
        F: FnMut(SubscriptionEvent) + Send + 'static,
    {
        self.ensure_ready()?;

        let (reply, response) = oneshot::channel();
        let command = Command::Subscribe {
            request: request.into(),
            subscriber: Subscriber::new(Box::new(on_event)),
            reply,
        };

        self.commands
            .send(command)
            .await
            .map_err(|_| self.not_ready())?;

        let id = response.await.map_err(|_| self.not_ready())??;

        Ok(Subscription {
            id,
            commands: self.commands.clone(),
        })
    }

    /// Starts a subscription and returns its events as a stream. The stream ends when
    /// the server completes the subscription, sends an error for it, or the connection goes away.
    pub async fn subscribe(&self, request: impl Into<SubscriptionRequest>) -> Result<SubscriptionStream, Error> {
        let (sender, events) = mpsc::unbounded_channel();

        let subscription = self
            .create_subscription_with(request, move |event| {
                sender.send(event).ok();
            })
            .await?;

        Ok(SubscriptionStream {
            subscription: Some(subscription),
            events,
        })
    }

    /// Sends `stop` for the subscription. Its callback is dropped right away, without
    /// waiting for the server to complete it.
    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        unsubscribe(&self.commands, id.clone()).await
    }

    /// Closes the connection and drops every subscription. Calling it more than once is fine.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();

        if self.commands.send(Command::Close { reply }).await.is_ok() {
            done.await.ok();
        }
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            _ => Err(self.not_ready()),
        }
    }

    fn not_ready(&self) -> Error {
        Error::NotReady(self.state())
    }
}

async fn unsubscribe(commands: &mpsc::Sender<Command>, id: SubscriptionId) {
    let (reply, done) = oneshot::channel();

    // Once the connection is gone every subscription is too.
    if commands
        .send(Command::Unsubscribe { id, reply: Some(reply) })
        .await
        .is_ok()
    {
        done.await.ok();
    }
}

/// Handle of a started subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    commands: mpsc::Sender<Command>,
}

impl Subscription {
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub async fn unsubscribe(self) {
        unsubscribe(&self.commands, self.id).await
    }
}

/// The events of one subscription, see [`SubscriptionClient::subscribe`].
///
/// Dropping the stream unsubscribes.
pub struct SubscriptionStream {
    subscription: Option<Subscription>,
    events: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl SubscriptionStream {
    pub fn id(&self) -> Option<&SubscriptionId> {
        self.subscription.as_ref().map(Subscription::id)
    }

    pub async fn unsubscribe(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
    }
}

impl Stream for SubscriptionStream {
    type Item = SubscriptionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        let Some(Subscription { id, commands }) = self.subscription.take() else {
            return;
        };

        let command = Command::Unsubscribe { id, reply: None };

        match commands.try_send(command) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(command)) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        commands.send(command).await.ok();
                    });
                }
                Err(_) => tracing::warn!("couldn't unsubscribe a dropped stream, no runtime to send stop from"),
            },
        }
    }
}
