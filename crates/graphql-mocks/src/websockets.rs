//! Serves a schema over websockets with async-graphql-axum, recording `connection_init`
//! payloads and optionally rejecting connections without the expected token.

use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};

use async_graphql::{http::ALL_WEBSOCKET_PROTOCOLS, Data};
use async_graphql_axum::{GraphQLProtocol, GraphQLWebSocket};
use axum::{
    body::{Body, HttpBody},
    extract::{FromRequestParts as _, Request, WebSocketUpgrade},
    response::{IntoResponse as _, Response},
};
use crossbeam_queue::SegQueue;
use futures::future::BoxFuture;
use tower::Service;

use crate::schema::CounterSchema;

#[derive(Clone)]
pub(crate) struct SubscriptionService {
    schema: CounterSchema,
    required_token: Option<Arc<str>>,
    init_payloads: Arc<SegQueue<serde_json::Value>>,
}

impl SubscriptionService {
    pub(crate) fn new(
        schema: CounterSchema,
        required_token: Option<String>,
        init_payloads: Arc<SegQueue<serde_json::Value>>,
    ) -> Self {
        Self {
            schema,
            required_token: required_token.map(Into::into),
            init_payloads,
        }
    }
}

impl<B> Service<Request<B>> for SubscriptionService
where
    B: HttpBody + Send + 'static,
{
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let service = self.clone();

        Box::pin(async move {
            let (mut parts, _body) = req.into_parts();

            let protocol = match GraphQLProtocol::from_request_parts(&mut parts, &()).await {
                Ok(protocol) => protocol,
                Err(err) => return Ok(err.into_response()),
            };
            let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
                Ok(upgrade) => upgrade,
                Err(err) => return Ok(err.into_response()),
            };

            let SubscriptionService {
                schema,
                required_token,
                init_payloads,
            } = service;

            let resp = upgrade.protocols(ALL_WEBSOCKET_PROTOCOLS).on_upgrade(move |stream| {
                GraphQLWebSocket::new(stream, schema.into_inner(), protocol)
                    .on_connection_init(move |payload| async move {
                        init_payloads.push(payload.clone());

                        if let Some(token) = required_token {
                            let provided = payload.get("token").and_then(serde_json::Value::as_str);
                            if provided != Some(&*token) {
                                return Err(async_graphql::Error::new("invalid token"));
                            }
                        }

                        let mut out = Data::default();
                        out.insert(ConnectionInitPayload(payload));
                        out.insert(parts.headers);
                        Ok(out)
                    })
                    .serve()
            });

            Ok(resp.into_response())
        })
    }
}

/// The `connection_init` payload of the current connection, available to resolvers.
#[derive(Debug)]
pub struct ConnectionInitPayload(pub serde_json::Value);
