use graphql_mocks::{MockSocket, ScriptedServer};
use graphql_subscription_client::{ConnectionState, SubscriptionClient, SubscriptionEvent, SubscriptionRequest};
use integration_tests::{runtime, EventRecorder};
use serde_json::json;

/// Accepts the connection and waits for `count` start messages.
async fn accept_subscriptions(socket: &mut MockSocket, count: usize) {
    socket.accept().await;
    for _ in 0..count {
        let start = socket.recv().await.unwrap();
        assert_eq!(start["type"], "start");
    }
}

#[test]
fn data_reaches_the_matching_callback() {
    runtime().block_on(async move {
        let server = ScriptedServer::start(|mut socket| async move {
            socket.accept().await;
            let start = socket.recv().await.unwrap();
            assert_eq!(start["id"], "1");

            socket
                .send(json!({"id": "1", "type": "data", "payload": {"onX": 1}}))
                .await;
            socket.wait_for_close().await;
        })
        .await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .init_payload(json!({"token": "abc"}))
            .connect()
            .await
            .unwrap();

        let (mut recorder, callback) = EventRecorder::new();
        let subscription = client
            .create_subscription("subscription{onX}", json!({}), callback)
            .await
            .unwrap();

        assert_eq!(subscription.id().as_str(), "1");
        assert_eq!(recorder.next().await, SubscriptionEvent::Data(json!({"onX": 1})));

        insta::assert_json_snapshot!(server.drain_received_messages(), @r###"
        [
          {
            "type": "connection_init",
            "payload": {
              "token": "abc"
            }
          },
          {
            "type": "start",
            "id": "1",
            "payload": {
              "query": "subscription{onX}",
              "variables": {}
            }
          }
        ]
        "###);

        client.close().await;
    });
}

#[test]
fn interleaved_subscriptions_are_demultiplexed() {
    runtime().block_on(async move {
        let server = ScriptedServer::start(|mut socket| async move {
            accept_subscriptions(&mut socket, 3).await;

            for (id, value) in [("2", 20), ("1", 10), ("3", 30), ("2", 21), ("1", 11)] {
                socket
                    .send(json!({"id": id, "type": "data", "payload": {"value": value}}))
                    .await;
            }
            for id in ["1", "2", "3"] {
                socket.send(json!({"id": id, "type": "complete"})).await;
            }

            socket.wait_for_close().await;
        })
        .await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let mut recorders = Vec::new();
        for _ in 0..3 {
            let (recorder, callback) = EventRecorder::new();
            client
                .create_subscription("subscription { value }", (), callback)
                .await
                .unwrap();
            recorders.push(recorder);
        }

        let mut payloads = Vec::new();
        for recorder in recorders {
            let events = recorder.finished().await;
            payloads.push(events.into_iter().map(SubscriptionEvent::into_payload).collect::<Vec<_>>());
        }

        assert_eq!(
            payloads,
            vec![
                vec![json!({"value": 10}), json!({"value": 11})],
                vec![json!({"value": 20}), json!({"value": 21})],
                vec![json!({"value": 30})],
            ]
        );
        assert_eq!(client.state(), ConnectionState::Ready);

        client.close().await;
    });
}

#[test]
fn data_after_complete_is_dropped() {
    runtime().block_on(async move {
        let server = ScriptedServer::start(|mut socket| async move {
            accept_subscriptions(&mut socket, 2).await;

            socket.send(json!({"id": "1", "type": "complete"})).await;
            socket
                .send(json!({"id": "1", "type": "data", "payload": {"late": true}}))
                .await;
            socket
                .send(json!({"id": "2", "type": "data", "payload": {"sentinel": true}}))
                .await;

            socket.wait_for_close().await;
        })
        .await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let (first, callback) = EventRecorder::new();
        client.create_subscription("subscription { a }", (), callback).await.unwrap();

        let (mut second, callback) = EventRecorder::new();
        client.create_subscription("subscription { b }", (), callback).await.unwrap();

        assert_eq!(second.next().await, SubscriptionEvent::Data(json!({"sentinel": true})));
        assert_eq!(first.finished().await, vec![]);

        client.close().await;
    });
}

#[test]
fn error_ends_only_its_own_subscription() {
    runtime().block_on(async move {
        let server = ScriptedServer::start(|mut socket| async move {
            accept_subscriptions(&mut socket, 2).await;

            socket
                .send(json!({"id": "1", "type": "error", "payload": {"message": "boom"}}))
                .await;
            socket
                .send(json!({"id": "1", "type": "data", "payload": {"late": true}}))
                .await;
            socket
                .send(json!({"id": "2", "type": "data", "payload": {"still": "alive"}}))
                .await;

            socket.wait_for_close().await;
        })
        .await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let (first, callback) = EventRecorder::new();
        client.create_subscription("subscription { a }", (), callback).await.unwrap();

        let (mut second, callback) = EventRecorder::new();
        client.create_subscription("subscription { b }", (), callback).await.unwrap();

        assert_eq!(
            first.finished().await,
            vec![SubscriptionEvent::Error(json!({"message": "boom"}))]
        );
        assert_eq!(second.next().await, SubscriptionEvent::Data(json!({"still": "alive"})));
        assert_eq!(client.state(), ConnectionState::Ready);

        client.close().await;
    });
}

#[test]
fn unexpected_frames_are_ignored() {
    runtime().block_on(async move {
        let server = ScriptedServer::start(|mut socket| async move {
            accept_subscriptions(&mut socket, 1).await;

            socket.send(json!({"type": "ping"})).await;
            socket.send(json!({"type": "ka"})).await;
            socket.send_text("{this is not json").await;
            socket.send(json!({"type": "data", "payload": {"missing": "id"}})).await;
            socket
                .send(json!({"id": "42", "type": "data", "payload": {"unknown": "id"}}))
                .await;
            socket.send(json!({"type": "connection_ack"})).await;
            socket
                .send(json!({"id": "1", "type": "data", "payload": {"onX": 1}}))
                .await;

            socket.wait_for_close().await;
        })
        .await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let (mut recorder, callback) = EventRecorder::new();
        client
            .create_subscription("subscription { onX }", (), callback)
            .await
            .unwrap();

        assert_eq!(recorder.next().await, SubscriptionEvent::Data(json!({"onX": 1})));
        assert!(recorder.drain().is_empty());
        assert_eq!(client.state(), ConnectionState::Ready);

        client.close().await;
    });
}

#[test]
fn variables_and_operation_name_are_sent() {
    runtime().block_on(async move {
        let server = ScriptedServer::start(|mut socket| async move {
            accept_subscriptions(&mut socket, 1).await;
            socket
                .send(json!({"id": "1", "type": "data", "payload": {"onX": 5}}))
                .await;
            socket.wait_for_close().await;
        })
        .await;

        let client = SubscriptionClient::builder(server.websocket_url())
            .connect()
            .await
            .unwrap();

        let request = SubscriptionRequest::new("subscription OnX($start: Int!, $count: Int!) { onX(start: $start, count: $count) }")
            .variables(json!({"start": 5, "count": 1}))
            .unwrap()
            .operation_name("OnX");

        let (mut recorder, callback) = EventRecorder::new();
        client.create_subscription_with(request, callback).await.unwrap();
        recorder.next().await;

        let messages = server.drain_received_messages();
        insta::assert_json_snapshot!(messages[1], @r###"
        {
          "type": "start",
          "id": "1",
          "payload": {
            "query": "subscription OnX($start: Int!, $count: Int!) { onX(start: $start, count: $count) }",
            "variables": {
              "start": 5,
              "count": 1
            },
            "operationName": "OnX"
          }
        }
        "###);

        client.close().await;
    });
}
