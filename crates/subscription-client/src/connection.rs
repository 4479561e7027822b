//! The task that owns the websocket: it runs the `connection_init` handshake and then
//! demultiplexes server frames to subscribers while executing commands from the client.

use std::{fmt, ops::ControlFlow};

use async_tungstenite::tungstenite::{self, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};

use crate::{
    protocol::{ClientMessage, Frame, ServerMessage},
    registry::{Subscriber, SubscriptionId, SubscriptionRegistry},
    types::{SubscriptionEvent, SubscriptionRequest},
    Error, InitPayload,
};

/// Lifecycle of a connection. `Failed` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that looks like a tungstenite websocket.
pub trait WebsocketConnection:
    Stream<Item = Result<Message, tungstenite::Error>> + Sink<Message, Error = tungstenite::Error> + Unpin + Send + 'static
{
}

impl<T> WebsocketConnection for T where
    T: Stream<Item = Result<Message, tungstenite::Error>>
        + Sink<Message, Error = tungstenite::Error>
        + Unpin
        + Send
        + 'static
{
}

pub(crate) type DisconnectCallback = Box<dyn FnOnce(&Error) + Send>;

pub(crate) enum Command {
    Subscribe {
        request: SubscriptionRequest,
        subscriber: Subscriber,
        reply: oneshot::Sender<Result<SubscriptionId, Error>>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: Option<oneshot::Sender<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Connection<S> {
    socket: S,
    registry: SubscriptionRegistry,
    state: watch::Sender<ConnectionState>,
    on_disconnected: Option<DisconnectCallback>,
}

impl<S: WebsocketConnection> Connection<S> {
    /// Sends `connection_init` and waits for the server to acknowledge it.
    pub(crate) async fn handshake(
        mut socket: S,
        init_payload: &InitPayload,
        state: watch::Sender<ConnectionState>,
    ) -> Result<Self, Error> {
        state.send_replace(ConnectionState::Handshaking);

        if let Err(error) = Self::wait_for_ack(&mut socket, init_payload).await {
            state.send_replace(ConnectionState::Failed);
            socket.close().await.ok();
            return Err(error);
        }

        tracing::debug!("connection acknowledged");
        state.send_replace(ConnectionState::Ready);

        Ok(Connection {
            socket,
            registry: SubscriptionRegistry::default(),
            state,
            on_disconnected: None,
        })
    }

    async fn wait_for_ack(socket: &mut S, init_payload: &InitPayload) -> Result<(), Error> {
        // A failing producer means nothing is ever sent on this socket.
        let payload = init_payload.resolve().await?;

        let init = ClientMessage::ConnectionInit {
            payload: payload.as_ref(),
        };
        socket.send(init.encode()?).await?;

        while let Some(message) = socket.next().await {
            match Frame::decode(&message?) {
                Frame::Message(ServerMessage::ConnectionAck) => return Ok(()),
                Frame::Message(ServerMessage::ConnectionError { payload }) => {
                    return Err(Error::ConnectionRejected { payload });
                }
                Frame::Close => return Err(Error::ClosedDuringHandshake),
                Frame::Message(ServerMessage::Ka | ServerMessage::Unknown) | Frame::Ignored => {}
                Frame::Message(message) => {
                    tracing::warn!("unexpected message before connection_ack: {message:?}");
                }
                Frame::Malformed(error) => {
                    tracing::warn!("error decoding websocket message: {error}");
                }
            }
        }

        Err(Error::ClosedDuringHandshake)
    }

    pub(crate) fn on_disconnected(mut self, callback: Option<DisconnectCallback>) -> Self {
        self.on_disconnected = callback;
        self
    }

    /// Message handling loop. Frames are handled one at a time in arrival order,
    /// every subscriber callback returns before the next frame is read.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                message = self.socket.next() => {
                    if let ControlFlow::Break(error) = self.handle_incoming(message) {
                        self.fail(error).await;
                        return;
                    }
                }
                command = commands.recv() => {
                    let flow = match command {
                        Some(Command::Subscribe { request, subscriber, reply }) => {
                            self.subscribe(request, subscriber, reply).await
                        }
                        Some(Command::Unsubscribe { id, reply }) => {
                            let flow = self.unsubscribe(&id).await;
                            if let Some(reply) = reply {
                                reply.send(()).ok();
                            }
                            flow
                        }
                        Some(Command::Close { reply }) => {
                            self.shutdown().await;
                            reply.send(()).ok();
                            return;
                        }
                        // Every client handle is gone, nobody can observe this connection anymore.
                        None => {
                            self.shutdown().await;
                            return;
                        }
                    };

                    if let ControlFlow::Break(error) = flow {
                        self.fail(error).await;
                        return;
                    }
                }
            }
        }
    }

    fn handle_incoming(&mut self, message: Option<Result<Message, tungstenite::Error>>) -> ControlFlow<Error> {
        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(error)) => return ControlFlow::Break(Error::Websocket(error)),
            None => return ControlFlow::Break(Error::ConnectionLost),
        };

        let message = match Frame::decode(&message) {
            Frame::Message(message) => message,
            Frame::Ignored => return ControlFlow::Continue(()),
            Frame::Close => return ControlFlow::Break(Error::ConnectionLost),
            Frame::Malformed(error) => {
                tracing::warn!("error decoding websocket message: {error}");
                return ControlFlow::Continue(());
            }
        };

        match message {
            ServerMessage::Data { id, payload } => match self.registry.lookup(&id) {
                Some(subscriber) => subscriber.deliver(SubscriptionEvent::Data(payload)),
                None => tracing::debug!(id = %id, "dropping data for an unknown subscription"),
            },
            ServerMessage::Error { id: Some(id), payload } => match self.registry.remove(&id) {
                Some(mut subscriber) => {
                    tracing::debug!(id = %id, "subscription failed");
                    subscriber.deliver(SubscriptionEvent::Error(payload));
                }
                None => tracing::debug!(id = %id, "dropping error for an unknown subscription"),
            },
            ServerMessage::Error { id: None, payload } => {
                return ControlFlow::Break(Error::ConnectionError { payload });
            }
            ServerMessage::Complete { id } => {
                if self.registry.remove(&id).is_some() {
                    tracing::debug!(id = %id, live = self.registry.len(), "subscription completed");
                }
            }
            ServerMessage::Ka => tracing::trace!("keep alive"),
            ServerMessage::ConnectionAck | ServerMessage::ConnectionError { .. } => {
                tracing::warn!("ignoring handshake message on a ready connection: {message:?}");
            }
            ServerMessage::Unknown => tracing::debug!("ignoring message of an unknown type"),
        }

        ControlFlow::Continue(())
    }

    async fn subscribe(
        &mut self,
        request: SubscriptionRequest,
        subscriber: Subscriber,
        reply: oneshot::Sender<Result<SubscriptionId, Error>>,
    ) -> ControlFlow<Error> {
        let id = self.registry.register(subscriber);

        let message = match (ClientMessage::Start {
            id: id.as_str(),
            payload: &request,
        })
        .encode()
        {
            Ok(message) => message,
            Err(error) => {
                self.registry.remove(id.as_str());
                reply.send(Err(error)).ok();
                return ControlFlow::Continue(());
            }
        };

        // `send` flushes, the caller only hears about the subscription once
        // the start message has been written to the socket.
        if let Err(error) = self.socket.send(message).await {
            self.registry.remove(id.as_str());
            reply.send(Err(Error::ConnectionLost)).ok();
            return ControlFlow::Break(Error::Websocket(error));
        }

        tracing::debug!(id = %id, live = self.registry.len(), "subscription started");
        reply.send(Ok(id)).ok();

        ControlFlow::Continue(())
    }

    /// Sends `stop` if the subscription is still live.
    async fn unsubscribe(&mut self, id: &SubscriptionId) -> ControlFlow<Error> {
        if self.registry.remove(id.as_str()).is_none() {
            return ControlFlow::Continue(());
        }

        let result = match (ClientMessage::Stop { id: id.as_str() }).encode() {
            Ok(message) => self.socket.send(message).await,
            Err(error) => {
                tracing::warn!("couldn't encode stop message: {error}");
                Ok(())
            }
        };

        if let Err(error) = result {
            return ControlFlow::Break(Error::Websocket(error));
        }

        tracing::debug!(id = %id, live = self.registry.len(), "subscription stopped");
        ControlFlow::Continue(())
    }

    /// Closes the socket on request of the client. No per-subscription `stop` is sent.
    async fn shutdown(&mut self) {
        self.state.send_replace(ConnectionState::Closing);

        if !self.registry.is_empty() {
            tracing::debug!(live = self.registry.len(), "dropping live subscriptions");
        }
        self.registry.clear();

        if let Err(error) = self.socket.close().await {
            tracing::debug!("error closing websocket: {error}");
        }

        self.state.send_replace(ConnectionState::Closed);
        tracing::debug!("connection closed");
    }

    /// Tears the connection down after a fatal error, orphaning every live subscription.
    async fn fail(&mut self, error: Error) {
        tracing::warn!(live = self.registry.len(), "connection failed: {error}");

        self.state.send_replace(ConnectionState::Failed);
        self.registry.clear();
        self.socket.close().await.ok();

        if let Some(callback) = self.on_disconnected.take() {
            callback(&error);
        }
    }
}
