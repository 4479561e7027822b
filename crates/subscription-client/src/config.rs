use std::collections::BTreeMap;

use url::Url;

use crate::protocol::GRAPHQL_WS_PROTOCOL;

/// Where and how to open the subscription connection.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// The websocket endpoint of the server under test, e.g. `ws://127.0.0.1:4000/graphql`.
    pub url: Url,
    /// The websocket subprotocol to request.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Extra headers for the websocket upgrade request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// A static payload for `connection_init`.
    #[serde(default)]
    pub init_payload: Option<serde_json::Value>,
}

impl ClientConfig {
    pub fn new(url: Url) -> Self {
        ClientConfig {
            url,
            protocol: default_protocol(),
            headers: BTreeMap::new(),
            init_payload: None,
        }
    }
}

fn default_protocol() -> String {
    GRAPHQL_WS_PROTOCOL.to_string()
}
