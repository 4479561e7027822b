use serde_json::{Map, Value};

use crate::Error;

/// The payload of a `start` message.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SubscriptionRequest {
    pub query: String,
    pub variables: Map<String, Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl SubscriptionRequest {
    pub fn new(query: impl Into<String>) -> Self {
        SubscriptionRequest {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
        }
    }

    /// Sets the variables of the operation. They have to serialize to a JSON object or null.
    pub fn variables(mut self, variables: impl serde::Serialize) -> Result<Self, Error> {
        self.variables = match serde_json::to_value(variables)? {
            Value::Object(variables) => variables,
            Value::Null => Map::new(),
            _ => return Err(Error::InvalidVariables),
        };

        Ok(self)
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

impl From<&str> for SubscriptionRequest {
    fn from(query: &str) -> Self {
        SubscriptionRequest::new(query)
    }
}

impl From<String> for SubscriptionRequest {
    fn from(query: String) -> Self {
        SubscriptionRequest::new(query)
    }
}

/// Something the server sent for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The payload of a `data` message.
    Data(Value),
    /// The payload of an `error` message. No further events follow it.
    Error(Value),
}

impl SubscriptionEvent {
    pub fn payload(&self) -> &Value {
        match self {
            SubscriptionEvent::Data(payload) | SubscriptionEvent::Error(payload) => payload,
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            SubscriptionEvent::Data(payload) | SubscriptionEvent::Error(payload) => payload,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SubscriptionEvent::Error(_))
    }
}
