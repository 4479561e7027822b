//! The client against a real GraphQL server implementation.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::StreamExt;
use graphql_mocks::{CounterSchema, MockGraphQlServer};
use graphql_subscription_client::{
    ClientConfig, ConnectionState, Error, SubscriptionClient, SubscriptionEvent, SubscriptionRequest,
};
use integration_tests::{runtime, with_timeout, EventRecorder};
use serde_json::json;

#[test]
fn counts_per_subscription() {
    runtime().block_on(async move {
        let server = MockGraphQlServer::new(CounterSchema::default()).await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let (first, callback) = EventRecorder::new();
        client
            .create_subscription(
                "subscription($count: Int!) { onX(count: $count) }",
                json!({"count": 3}),
                callback,
            )
            .await
            .unwrap();

        let (second, callback) = EventRecorder::new();
        client
            .create_subscription("subscription { onX(start: 10) }", (), callback)
            .await
            .unwrap();

        let payloads = first
            .finished()
            .await
            .into_iter()
            .map(SubscriptionEvent::into_payload)
            .collect::<Vec<_>>();

        insta::assert_json_snapshot!(payloads, @r###"
        [
          {
            "data": {
              "onX": 1
            }
          },
          {
            "data": {
              "onX": 2
            }
          },
          {
            "data": {
              "onX": 3
            }
          }
        ]
        "###);

        assert_eq!(
            second.finished().await,
            vec![SubscriptionEvent::Data(json!({"data": {"onX": 10}}))]
        );
        assert_eq!(client.state(), ConnectionState::Ready);

        client.close().await;
    });
}

#[test]
fn init_payload_reaches_the_resolvers() {
    runtime().block_on(async move {
        let server = MockGraphQlServer::with_required_token(CounterSchema::default(), "abc").await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .init_payload(json!({"token": "abc"}))
            .connect()
            .await
            .unwrap();

        let events = client
            .subscribe("subscription { token }")
            .await
            .unwrap()
            .collect::<Vec<_>>();

        assert_eq!(
            with_timeout(events).await,
            vec![SubscriptionEvent::Data(json!({"data": {"token": "abc"}}))]
        );
        assert_eq!(server.drain_init_payloads(), vec![json!({"token": "abc"})]);

        client.close().await;
    });
}

#[test]
fn wrong_token_is_rejected() {
    runtime().block_on(async move {
        let server = MockGraphQlServer::with_required_token(CounterSchema::default(), "abc").await;

        let connected = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let result = SubscriptionClient::builder(server.websocket_url())
            .init_payload(json!({"token": "xyz"}))
            .on_connected({
                let connected = connected.clone();
                move || {
                    connected.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_connection_failed({
                let failed = failed.clone();
                move |_| {
                    failed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .connect()
            .await;

        let Err(Error::ConnectionRejected { payload }) = result else {
            panic!("expected a rejection, got {result:?}");
        };

        assert!(payload.is_some());
        assert_eq!(connected.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn unsubscribing_an_endless_subscription() {
    runtime().block_on(async move {
        let server = MockGraphQlServer::new(CounterSchema::default()).await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let (mut ticks, callback) = EventRecorder::new();
        let subscription = client
            .create_subscription("subscription { ticks(intervalMs: 5) }", (), callback)
            .await
            .unwrap();

        assert_eq!(ticks.next().await, SubscriptionEvent::Data(json!({"data": {"ticks": 0}})));
        assert_eq!(ticks.next().await, SubscriptionEvent::Data(json!({"data": {"ticks": 1}})));

        subscription.unsubscribe().await;
        ticks.finished().await;

        let mut stream = client
            .subscribe(SubscriptionRequest::new("subscription { onX(start: 7) }"))
            .await
            .unwrap();

        assert_eq!(
            with_timeout(stream.next()).await,
            Some(SubscriptionEvent::Data(json!({"data": {"onX": 7}})))
        );

        client.close().await;
    });
}

#[test]
fn invalid_subscription_yields_a_single_event() {
    runtime().block_on(async move {
        let server = MockGraphQlServer::new(CounterSchema::default()).await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let events = client
            .subscribe("subscription { doesNotExist }")
            .await
            .unwrap()
            .collect::<Vec<_>>();
        let events = with_timeout(events).await;

        assert_eq!(events.len(), 1, "{events:?}");
        assert!(events[0].payload()["errors"].is_array() || events[0].is_error(), "{events:?}");
        assert_eq!(client.state(), ConnectionState::Ready);

        client.close().await;
    });
}

#[test]
fn client_from_configuration() {
    runtime().block_on(async move {
        let server = MockGraphQlServer::with_required_token(CounterSchema::default(), "secret").await;

        let config: ClientConfig = toml::from_str(&indoc::formatdoc! {r#"
            url = "{url}"

            [headers]
            x-test = "configured"

            [init_payload]
            token = "secret"
        "#,
            url = server.websocket_url()
        })
        .unwrap();

        let client = SubscriptionClient::from_config(config).connect().await.unwrap();

        let events = client
            .subscribe(
                SubscriptionRequest::new("subscription Counter { onX(count: 2) }").operation_name("Counter"),
            )
            .await
            .unwrap()
            .map(SubscriptionEvent::into_payload)
            .collect::<Vec<_>>();

        assert_eq!(
            with_timeout(events).await,
            vec![json!({"data": {"onX": 1}}), json!({"data": {"onX": 2}})]
        );

        let events = client
            .subscribe(r#"subscription { header(name: "x-test") }"#)
            .await
            .unwrap()
            .map(SubscriptionEvent::into_payload)
            .collect::<Vec<_>>();

        assert_eq!(
            with_timeout(events).await,
            vec![json!({"data": {"header": "configured"}})]
        );

        client.close().await;
    });
}
