//! End-to-end tests against a real listener using a WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as AxumMessage, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Request};
use axum::response::IntoResponse;
use firehose_core::{CLOSE, CONNECTION, Target, WILDCARD};
use firehose_server::upgrade::{UpgradeHandler, handler_fn};
use firehose_server::{Firehose, FirehoseOptions, HostServer, Invocation, ServerConfig};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug)]
struct Seen {
    event: String,
    handler: String,
    conn_id: String,
    data: Option<Value>,
    remote: Option<SocketAddr>,
    pool_size: usize,
}

fn recorder(tx: &mpsc::UnboundedSender<Seen>) -> firehose_server::Invoker {
    let tx = tx.clone();
    Arc::new(move |inv: Invocation| {
        let _ = tx.send(Seen {
            event: inv.event,
            handler: inv.target.handler,
            conn_id: inv.client.id().to_owned(),
            data: inv.data,
            remote: inv.client.remote_address(),
            pool_size: inv.pool.size(),
        });
    })
}

/// Upgrade handler that echoes text frames back, standing in for another
/// protocol sharing the host server.
fn echo_fallback() -> Arc<dyn UpgradeHandler> {
    handler_fn(|request: Request| async move {
        let (mut parts, _body) = request.into_parts();
        match <WebSocketUpgrade as FromRequestParts<()>>::from_request_parts(&mut parts, &()).await
        {
            Ok(upgrade) => upgrade.on_upgrade(|mut socket| async move {
                while let Some(Ok(msg)) = socket.recv().await {
                    if matches!(msg, AxumMessage::Text(_)) && socket.send(msg).await.is_err() {
                        break;
                    }
                }
            }),
            Err(rejection) => rejection.into_response(),
        }
    })
}

struct Harness {
    addr: SocketAddr,
    server: HostServer,
    events: mpsc::UnboundedReceiver<Seen>,
}

impl Harness {
    async fn next_event(&mut self) -> Seen {
        timeout(TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for dispatch")
            .expect("event channel closed")
    }

    async fn connect(&self, path: &str) -> WsStream {
        let (ws, _resp) = connect_async(format!("ws://{}{path}", self.addr))
            .await
            .unwrap();
        ws
    }
}

/// Boot a host server on an ephemeral port with the firehose installed.
async fn boot(with_fallback: bool) -> Harness {
    let firehose = Arc::new(Firehose::default());
    let (tx, events) = mpsc::unbounded_channel();

    for event in [CONNECTION, CLOSE, "chat"] {
        firehose.register(
            Some(recorder(&tx)),
            Target::new("fn-test", event),
            &FirehoseOptions::new(event),
        );
    }
    firehose.register(
        Some(Arc::new(|inv: Invocation| {
            let _ = inv.client.send("pong", inv.data.as_ref());
        })),
        Target::new("fn-test", "ping"),
        &FirehoseOptions::new("ping"),
    );
    firehose.register(
        Some(Arc::new(|inv: Invocation| {
            let _ = inv.pool.broadcast("announcement", inv.data.as_ref());
        })),
        Target::new("fn-test", "shout"),
        &FirehoseOptions::new("shout"),
    );

    let server = HostServer::new(ServerConfig::default(), firehose, None);
    if with_fallback {
        server.upgrades().on(echo_fallback());
    }
    let _mux = server.install_firehose();
    let (addr, _handle) = server.listen().await.unwrap();

    Harness {
        addr,
        server,
        events,
    }
}

async fn next_text(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("socket ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn connection_event_carries_remote_address() {
    let mut h = boot(false).await;
    let _ws = h.connect("/firehose").await;

    let seen = h.next_event().await;
    assert_eq!(seen.event, CONNECTION);
    assert_eq!(seen.handler, CONNECTION);
    assert!(seen.conn_id.starts_with("conn_"));
    assert_eq!(seen.data, None);
    assert_eq!(seen.pool_size, 1);
    assert!(seen.remote.unwrap().ip().is_loopback());
}

#[tokio::test]
async fn envelope_dispatched_by_name() {
    let mut h = boot(false).await;
    let mut ws = h.connect("/firehose").await;
    let opened = h.next_event().await;

    ws.send(Message::Text(
        json!({"name": "chat", "data": {"text": "hello"}}).to_string().into(),
    ))
    .await
    .unwrap();

    let seen = h.next_event().await;
    assert_eq!(seen.event, "chat");
    assert_eq!(seen.conn_id, opened.conn_id);
    assert_eq!(seen.data, Some(json!({"text": "hello"})));
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let mut h = boot(false).await;
    let mut ws = h.connect("/firehose").await;
    let _ = h.next_event().await;

    for bad in ["not json", "[]", r#"{"data":1}"#, r#"{"name":null}"#] {
        ws.send(Message::Text(bad.into())).await.unwrap();
    }
    ws.send(Message::Binary(br#"{"name":"chat","data":7}"#.to_vec().into()))
        .await
        .unwrap();

    // the first dispatch after the garbage is the binary envelope
    let seen = h.next_event().await;
    assert_eq!(seen.event, "chat");
    assert_eq!(seen.data, Some(json!(7)));
}

#[tokio::test]
async fn invoker_replies_on_same_connection() {
    let h = boot(false).await;
    let mut ws = h.connect("/firehose").await;

    ws.send(Message::Text(r#"{"name":"ping","data":{"seq":3}}"#.into()))
        .await
        .unwrap();

    assert_eq!(
        next_text(&mut ws).await,
        json!({"name": "pong", "data": {"seq": 3}})
    );
}

#[tokio::test]
async fn broadcast_reaches_all_clients() {
    let mut h = boot(false).await;
    let mut a = h.connect("/firehose").await;
    let _ = h.next_event().await;
    let mut b = h.connect("/firehose").await;
    let _ = h.next_event().await;

    a.send(Message::Text(r#"{"name":"shout","data":"hi all"}"#.into()))
        .await
        .unwrap();

    let expected = json!({"name": "announcement", "data": "hi all"});
    assert_eq!(next_text(&mut a).await, expected);
    assert_eq!(next_text(&mut b).await, expected);
}

#[tokio::test]
async fn close_event_after_disconnect() {
    let mut h = boot(false).await;
    let mut ws = h.connect("/firehose").await;
    let opened = h.next_event().await;

    ws.close(None).await.unwrap();

    let closed = h.next_event().await;
    assert_eq!(closed.event, CLOSE);
    assert_eq!(closed.conn_id, opened.conn_id);
    assert_eq!(closed.pool_size, 0);
    assert_eq!(h.server.firehose().pool().size(), 0);
}

#[tokio::test]
async fn client_close_completes_handshake() {
    let mut h = boot(false).await;
    let mut ws = h.connect("/firehose").await;
    let _ = h.next_event().await;

    ws.close(None).await.unwrap();

    let reply = timeout(TIMEOUT, ws.next()).await.unwrap();
    assert!(
        matches!(reply, None | Some(Ok(Message::Close(_)))),
        "expected close reply, got {reply:?}"
    );
    assert_eq!(h.next_event().await.event, CLOSE);
}

#[tokio::test]
async fn client_frame_named_close_is_not_dispatched() {
    let mut h = boot(false).await;
    let mut ws = h.connect("/firehose").await;
    let opened = h.next_event().await;

    ws.send(Message::Text(r#"{"name":"close"}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Text(r#"{"name":"chat"}"#.into()))
        .await
        .unwrap();
    assert_eq!(h.next_event().await.event, "chat");

    ws.close(None).await.unwrap();
    let closed = h.next_event().await;
    assert_eq!(closed.event, CLOSE);
    assert_eq!(closed.conn_id, opened.conn_id);
    assert!(
        timeout(Duration::from_millis(200), h.events.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn other_paths_reach_fallback() {
    let h = boot(true).await;
    let mut ws = h.connect("/legacy").await;

    ws.send(Message::Text("echo me".into())).await.unwrap();

    let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(msg.to_text().unwrap(), "echo me");
    assert_eq!(h.server.firehose().pool().size(), 0);
}

#[tokio::test]
async fn firehose_path_still_accepted_with_fallback() {
    let mut h = boot(true).await;
    let _ws = h.connect("/firehose").await;
    assert_eq!(h.next_event().await.event, CONNECTION);
}

#[tokio::test]
async fn other_paths_rejected_without_fallback() {
    let h = boot(false).await;
    let result = connect_async(format!("ws://{}/legacy", h.addr)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn wildcard_registration_sees_lifecycle_only() {
    let mut h = boot(false).await;
    let (tx, mut wild) = mpsc::unbounded_channel();
    h.server.firehose().register(
        Some(recorder(&tx)),
        Target::new("fn-wild", "all"),
        &FirehoseOptions::new(WILDCARD),
    );

    let mut ws = h.connect("/firehose").await;
    let _ = h.next_event().await;
    ws.send(Message::Text(r#"{"name":"chat"}"#.into()))
        .await
        .unwrap();
    let _ = h.next_event().await;
    ws.close(None).await.unwrap();
    let _ = h.next_event().await;

    let mut events = Vec::new();
    while let Ok(seen) = wild.try_recv() {
        events.push(seen.event);
    }
    assert_eq!(events, vec![CONNECTION, CLOSE]);
}

#[tokio::test]
async fn health_reports_live_connections() {
    let mut h = boot(false).await;
    let _ws = h.connect("/firehose").await;
    let _ = h.next_event().await;

    let body: Value = reqwest::get(format!("http://{}/health", h.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["registrations"], 5);
}
