use async_tungstenite::tungstenite;

use crate::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The websocket could not be opened
    #[error("opening the websocket connection: {0}")]
    Connect(#[source] tungstenite::Error),
    #[error(transparent)]
    Websocket(#[from] tungstenite::Error),
    #[error("invalid header {0}")]
    InvalidHeader(String),
    /// The init payload producer returned an error
    #[error("evaluating the connection init payload: {0}")]
    InitPayload(String),
    /// The server answered `connection_init` with `connection_error`
    #[error("the server rejected the connection")]
    ConnectionRejected { payload: Option<serde_json::Value> },
    #[error("the connection was closed before it was acknowledged")]
    ClosedDuringHandshake,
    #[error("encoding a message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("subscription variables must be a JSON object")]
    InvalidVariables,
    /// An `error` message without a subscription id
    #[error("the server reported a connection error")]
    ConnectionError { payload: serde_json::Value },
    #[error("the connection was lost")]
    ConnectionLost,
    #[error("the connection is {0}")]
    NotReady(ConnectionState),
}
