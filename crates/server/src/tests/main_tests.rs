use super::*;
use std::time::Duration;

use axum::{body, body::Body, http::Request};
use futures::{SinkExt, StreamExt};
use presenter_core::{PresenterConfig, PresenterHandle};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn test_state(port: u16) -> (Arc<AppState>, PresenterHandle) {
    let scripture = Arc::new(ScriptureDb::open("sqlite::memory:").await.expect("db"));
    scripture
        .seed_book(0, "Genesis", "gn")
        .await
        .expect("seed book");
    scripture
        .insert_verse("kjv", 0, 1, 1, "In the beginning God created the heaven and the earth.")
        .await
        .expect("seed verse");
    let presenter = Presenter::spawn(scripture.clone(), PresenterConfig::default());
    let state = AppState::new(presenter.clone(), scripture, "192.168.1.50".into(), port);
    (Arc::new(state), presenter)
}

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (state, _presenter) = test_state(addr.port()).await;
    let app = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    addr
}

async fn next_json(socket: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame in time")
            .expect("socket open")
            .expect("frame");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("json frame");
        }
    }
}

async fn send_json(socket: &mut Client, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("send");
}

#[tokio::test]
async fn healthz_reports_ok() {
    let (state, _presenter) = test_state(4000).await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = build_router(state)
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn healthz_reports_unavailable_database() {
    let (state, _presenter) = test_state(4000).await;
    state.scripture.pool().close().await;

    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = build_router(state)
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn server_info_lists_host_port_and_devices() {
    let (state, presenter) = test_state(4000).await;
    let _phone = presenter
        .connect_session("192.168.1.77:50500")
        .await
        .expect("session");

    let request = Request::get("/server-info")
        .body(Body::empty())
        .expect("request");
    let response = build_router(state)
        .oneshot(request)
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let info: ServerInfo = serde_json::from_slice(&body).expect("json");
    assert_eq!(info.ip, "192.168.1.50");
    assert_eq!(info.port, 4000);
    assert_eq!(info.devices.len(), 1);
    assert_eq!(info.devices[0].address, "192.168.1.77:50500");
}

#[tokio::test]
async fn display_route_rejects_unknown_mode() {
    let addr = spawn_server().await;
    let result = connect_async(format!("ws://{addr}/display?mode=audience").as_str()).await;
    assert!(result.is_err(), "unknown display mode must not upgrade");
}

#[tokio::test]
async fn mobile_actions_reach_controller_display() {
    let addr = spawn_server().await;

    let (mut controller, _) = connect_async(format!("ws://{addr}/display?mode=controller").as_str())
        .await
        .expect("controller socket");
    let mut kinds = Vec::new();
    for _ in 0..4 {
        let frame = next_json(&mut controller).await;
        assert_eq!(frame["event"], "display");
        kinds.push(frame["data"]["message"]["kind"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(kinds, vec!["timer", "content", "style", "agenda"]);

    let (mut phone, _) = connect_async(format!("ws://{addr}/mobile").as_str())
        .await
        .expect("mobile socket");
    let state = next_json(&mut phone).await;
    assert_eq!(state["event"], "mobile-data");
    assert_eq!(state["data"]["type"], "presentation-state");

    let connected = next_json(&mut controller).await;
    assert_eq!(connected["event"], "mobile-connected");
    assert_eq!(
        connected["data"]["address"]
            .as_str()
            .map(|address| address.starts_with("127.0.0.1:")),
        Some(true)
    );

    send_json(
        &mut phone,
        json!({ "event": "mobile-action", "data": { "type": "set-timer", "payload": { "time": 90 } } }),
    )
    .await;
    let timer = next_json(&mut controller).await;
    assert_eq!(timer["data"]["message"]["kind"], "timer");
    assert_eq!(timer["data"]["message"]["payload"]["remainingSeconds"], 90);
    assert_eq!(timer["data"]["revision"], 1);
}

#[tokio::test]
async fn mobile_queries_and_errors_answer_on_same_socket() {
    let addr = spawn_server().await;
    let (mut phone, _) = connect_async(format!("ws://{addr}/mobile").as_str())
        .await
        .expect("mobile socket");
    next_json(&mut phone).await;

    send_json(
        &mut phone,
        json!({ "event": "mobile-action", "data": { "type": "bible-get-chapter", "payload": { "version": "kjv", "bookId": 0, "chapter": 1 } } }),
    )
    .await;
    let chapter = next_json(&mut phone).await;
    assert_eq!(chapter["data"]["type"], "bible-chapter");
    assert_eq!(
        chapter["data"]["payload"][0],
        "In the beginning God created the heaven and the earth."
    );

    send_json(
        &mut phone,
        json!({ "event": "mobile-action", "data": { "type": "edit-agenda", "payload": { "agenda": "no id" } } }),
    )
    .await;
    let error = next_json(&mut phone).await;
    assert_eq!(error["data"]["type"], "error");
    assert_eq!(error["data"]["payload"]["code"], "validation");
}

#[tokio::test]
async fn controller_intents_drive_general_display() {
    let addr = spawn_server().await;
    let (mut controller, _) = connect_async(format!("ws://{addr}/display?mode=controller").as_str())
        .await
        .expect("controller socket");
    let (mut general, _) = connect_async(format!("ws://{addr}/display?mode=general").as_str())
        .await
        .expect("general socket");
    for _ in 0..4 {
        next_json(&mut controller).await;
    }
    for _ in 0..3 {
        next_json(&mut general).await;
    }

    send_json(
        &mut controller,
        json!({
            "event": "intent",
            "data": { "type": "set-content", "payload": { "content": { "type": "custom", "data": { "title": "Welcome", "body": "Glad you are here" } } } }
        }),
    )
    .await;

    let timer = next_json(&mut general).await;
    assert_eq!(timer["data"]["message"]["kind"], "timer");
    assert!(timer["data"]["message"]["payload"].is_null());
    let content = next_json(&mut general).await;
    assert_eq!(content["data"]["message"]["kind"], "content");
    assert_eq!(content["data"]["message"]["payload"]["data"]["title"], "Welcome");
}
