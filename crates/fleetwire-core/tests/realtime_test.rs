#![allow(clippy::unwrap_used)]
// End-to-end: Session + Counter against a wiremock platform.

use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use fleetwire_core::{AuthCredentials, ConnectionState, Resource, Session, SessionConfig};

const ENDPOINT: &str = "/notification/realtime";

/// Matches a push request whose first message is addressed to `channel`.
struct MetaChannel(&'static str);

impl Match for MetaChannel {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|v| v.get(0)?.get("channel")?.as_str().map(|c| c == self.0))
            .unwrap_or(false)
    }
}

fn meta_ok(channel: &str, extra: Value) -> ResponseTemplate {
    let mut reply = json!({ "channel": channel, "successful": true });
    if let (Some(reply), Some(extra)) = (reply.as_object_mut(), extra.as_object()) {
        reply.extend(extra.clone());
    }
    ResponseTemplate::new(200).set_body_json(json!([reply]))
}

async fn mount_push(server: &MockServer, first_connect: Value) {
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(MetaChannel("/meta/handshake"))
        .respond_with(meta_ok("/meta/handshake", json!({ "clientId": "c-1" })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(MetaChannel("/meta/subscribe"))
        .respond_with(meta_ok("/meta/subscribe", json!({})))
        .mount(server)
        .await;

    // First cycle carries the payload, later cycles idle.
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(MetaChannel("/meta/connect"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(first_connect)
                .set_delay(Duration::from_millis(100)),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(MetaChannel("/meta/connect"))
        .respond_with(
            meta_ok("/meta/connect", json!({})).set_delay(Duration::from_millis(50)),
        )
        .mount(server)
        .await;
}

fn session(server: &MockServer) -> Session {
    let mut config = SessionConfig::new(
        server.uri().parse().unwrap(),
        AuthCredentials::Basic {
            username: "alice".into(),
            password: SecretString::from("secret".to_string()),
        },
    );
    config.tenant = Some("t1".into());
    Session::new(config).unwrap()
}

async fn next_change(rx: &mut mpsc::UnboundedReceiver<(usize, usize)>) -> (usize, usize) {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for count change")
        .expect("change channel closed")
}

#[tokio::test]
async fn counting_counter_follows_creates() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alarm/alarms"))
        .and(query_param("status", "ACTIVE"))
        .and(query_param("pageSize", "1"))
        .and(query_param("withTotalPages", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alarms": [{ "id": "1" }],
            "statistics": { "totalPages": 3, "pageSize": 1, "currentPage": 1 }
        })))
        .mount(&server)
        .await;

    mount_push(
        &server,
        json!([
            { "channel": "/meta/connect", "successful": true },
            { "channel": "/alarms/42", "data": {
                "realtimeAction": "CREATE",
                "data": { "id": "99", "status": "ACTIVE" }
            }}
        ]),
    )
    .await;

    let session = session(&server);
    let mut query = Map::new();
    query.insert("status".into(), json!("ACTIVE"));
    let counter = session.counter(Resource::Alarms, query);

    let (tx, mut rx) = mpsc::unbounded_channel();
    counter.on_change(move |new, old| {
        let _ = tx.send((new, old));
    });

    counter.start().await.unwrap();
    assert_eq!(counter.count(), 3);

    assert_eq!(next_change(&mut rx).await, (4, 3));

    let mut state = session.multiplexer().connection_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    counter.stop().unwrap();
    session.shutdown().await;
}

#[tokio::test]
async fn filtered_counter_tracks_matching_items() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/alarm/alarms"))
        .and(query_param("type", "X"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "alarms": [
                { "id": "1", "type": "X", "text": "one" },
                { "id": "2", "type": "Y", "text": "two" },
                { "id": "3", "type": "X", "text": "three" }
            ],
            "statistics": { "pageSize": 2000, "currentPage": 1 }
        })))
        .mount(&server)
        .await;

    mount_push(
        &server,
        json!([
            { "channel": "/meta/connect", "successful": true },
            { "channel": "/alarms/7", "data": {
                "realtimeAction": "UPDATE",
                "data": { "id": "2", "type": "X", "text": "two" }
            }}
        ]),
    )
    .await;

    let session = session(&server);
    let counter = session.counter(Resource::Alarms, Map::new());
    let mut filter = Map::new();
    filter.insert("type".into(), json!("X"));
    counter.filter(filter, Vec::new()).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    counter.on_change(move |new, old| {
        let _ = tx.send((new, old));
    });

    counter.start().await.unwrap();
    assert_eq!(counter.count(), 2);

    assert_eq!(next_change(&mut rx).await, (3, 2));
    assert_eq!(counter.items()[0], json!({ "id": "2", "type": "X" }));

    counter.stop().unwrap();
    session.shutdown().await;
}

#[tokio::test]
async fn shutdown_leaves_connection_disconnected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/event/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [],
            "statistics": { "totalPages": 0, "pageSize": 1, "currentPage": 1 }
        })))
        .mount(&server)
        .await;
    mount_push(&server, json!([{ "channel": "/meta/connect", "successful": true }])).await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(MetaChannel("/meta/disconnect"))
        .respond_with(meta_ok("/meta/disconnect", json!({})))
        .mount(&server)
        .await;

    let session = session(&server);
    let counter = session.counter(Resource::Events, Map::new());
    counter.start().await.unwrap();

    let mut state = session.multiplexer().connection_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    session.shutdown().await;
    assert_eq!(
        *session.multiplexer().connection_state().borrow(),
        ConnectionState::Disconnected
    );
}
