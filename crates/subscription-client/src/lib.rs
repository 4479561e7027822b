//! A client for GraphQL subscriptions over the `graphql-ws` websocket subprotocol,
//! meant for driving a GraphQL server under test.
//!
//! A single [`SubscriptionClient`] owns one websocket. Subscriptions started through it
//! get an id from a per-connection counter and are multiplexed over that socket:
//!
//! ```ignore
//! # async fn example() -> Result<(), graphql_subscription_client::Error> {
//! use graphql_subscription_client::SubscriptionClient;
//!
//! let client = SubscriptionClient::builder("ws://127.0.0.1:4000/graphql".parse().unwrap())
//!     .init_payload(serde_json::json!({"token": "abc"}))
//!     .connect()
//!     .await?;
//!
//! let subscription = client
//!     .create_subscription("subscription { onX }", serde_json::json!({}), |event| {
//!         println!("{event:?}");
//!     })
//!     .await?;
//!
//! subscription.unsubscribe().await;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod error;
mod init_payload;
mod registry;
mod types;

pub mod protocol;

pub use client::{ClientBuilder, Subscription, SubscriptionClient, SubscriptionStream};
pub use config::ClientConfig;
pub use connection::{ConnectionState, WebsocketConnection};
pub use error::Error;
pub use init_payload::InitPayload;
pub use registry::SubscriptionId;
pub use types::{SubscriptionEvent, SubscriptionRequest};
