//! Message definitions for the [graphql-ws subprotocol][1], the message set
//! spoken by `subscriptions-transport-ws` servers.
//!
//! [1]: https://github.com/apollographql/subscriptions-transport-ws/blob/master/PROTOCOL.md

use async_tungstenite::tungstenite::Message;

use crate::{types::SubscriptionRequest, Error};

/// The value sent in `Sec-WebSocket-Protocol` when opening a connection.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Frames the client sends to the server.
#[derive(serde::Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage<'a> {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<&'a serde_json::Value>,
    },
    Start {
        id: &'a str,
        payload: &'a SubscriptionRequest,
    },
    Stop {
        id: &'a str,
    },
}

impl ClientMessage<'_> {
    /// Encodes the message as a JSON text frame.
    pub fn encode(&self) -> Result<Message, Error> {
        Ok(Message::Text(serde_json::to_string(self)?))
    }
}

/// Frames the server sends to the client.
#[derive(serde::Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    ConnectionError {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Data {
        id: String,
        payload: serde_json::Value,
    },
    Error {
        #[serde(default)]
        id: Option<String>,
        payload: serde_json::Value,
    },
    Complete {
        id: String,
    },
    Ka,
    /// Any message type this client doesn't know about.
    #[serde(other)]
    Unknown,
}

/// The outcome of decoding a single websocket frame.
#[derive(Debug)]
pub enum Frame {
    Message(ServerMessage),
    /// The peer closed the socket.
    Close,
    /// Websocket level frames (ping, pong) that carry no protocol message.
    Ignored,
    /// A data frame that isn't a valid protocol message.
    Malformed(serde_json::Error),
}

impl Frame {
    pub fn decode(message: &Message) -> Frame {
        let result = match message {
            Message::Text(contents) => serde_json::from_str::<ServerMessage>(contents),
            Message::Binary(contents) => serde_json::from_slice::<ServerMessage>(contents),
            Message::Close(_) => return Frame::Close,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Frame::Ignored,
        };

        match result {
            Ok(message) => Frame::Message(message),
            Err(error) => Frame::Malformed(error),
        }
    }
}
