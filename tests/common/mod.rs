//! In-process mock of a WiNet device.
//!
//! Serves the overview websocket plus the HTTP lookups on an ephemeral port.
//! Socket behavior per requested service:
//! - `connect`: hands out token `abc`, or no token after `withhold_token()`
//! - `state`: `{power: 500}` when the token is `abc`, otherwise `unauthorized`
//! - `fault`: always `unauthorized`
//! - `runtime`: never answered
//! - `slow`: answered with the request echoed back after 200ms
//! - `noisy`: preceded by garbage, a service-less frame and an unrelated frame
//! - `bye`: the device closes the socket
//! - anything else: the request echoed back as `result_data`

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use winet::{ClientConfig, ConnectionEvent, WinetClient};

pub const TOKEN: &str = "abc";

#[derive(Clone, Default)]
pub struct MockDevice {
    requests: Arc<Mutex<Vec<Value>>>,
    tokenless: Arc<AtomicBool>,
}

impl MockDevice {
    /// Start the device and return it with its `host:port`.
    pub async fn start() -> (Self, SocketAddr) {
        let device = Self::default();
        let app = Router::new()
            .route("/ws/home/overview", get(overview))
            .route("/about/list", get(about))
            .route("/product/list", get(products))
            .route("/device/getParam", get(device_param))
            .route("/device/getType", get(device_type))
            .with_state(device.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await });
        (device, addr)
    }

    /// Requests received over the socket, in arrival order.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Most recent request for `service`.
    pub fn last_request(&self, service: &str) -> Option<Value> {
        self.requests().into_iter().rev().find(|r| r["service"] == service)
    }

    /// Answer later handshakes with success but no token.
    pub fn withhold_token(&self) {
        self.tokenless.store(true, Ordering::SeqCst);
    }

    fn record(&self, request: &Value) {
        self.requests.lock().expect("requests lock").push(request.clone());
    }
}

/// Client connected to `addr`, with its event subscription.
pub async fn connected_client(addr: SocketAddr) -> (WinetClient, broadcast::Receiver<ConnectionEvent>) {
    let client = WinetClient::new(ClientConfig::new(addr.to_string())).expect("client");
    let mut events = client.subscribe();
    client.connect();
    match next_event(&mut events).await {
        ConnectionEvent::Connected => {}
        other => panic!("expected Connected, got {other:?}"),
    }
    (client, events)
}

pub async fn next_event(events: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event timed out")
        .expect("event channel closed")
}

pub fn reply(service: &str, fields: Value) -> Value {
    let mut data = json!({ "service": service });
    if let (Some(map), Some(extra)) = (data.as_object_mut(), fields.as_object()) {
        map.extend(extra.clone());
    }
    json!({ "result_code": 1, "result_msg": "success", "result_data": data })
}

pub fn failure(service: &str, message: &str) -> Value {
    json!({ "result_code": 0, "result_msg": message, "result_data": { "service": service } })
}

// =============================================================================
// WEBSOCKET
// =============================================================================

async fn overview(State(device): State<MockDevice>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_socket(socket, device))
}

async fn run_socket(socket: WebSocket, device: MockDevice) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        device.record(&request);

        let service = request["service"].as_str().unwrap_or_default().to_owned();
        let token = request["token"].as_str().unwrap_or_default().to_owned();
        let send = |value: Value| {
            let _ = tx.send(Message::Text(value.to_string().into()));
        };

        match service.as_str() {
            "connect" if device.tokenless.load(Ordering::SeqCst) => send(reply("connect", json!({}))),
            "connect" => send(reply("connect", json!({ "token": TOKEN }))),
            "state" if token == TOKEN => send(reply("state", json!({ "power": 500 }))),
            "state" | "fault" => send(failure(&service, "unauthorized")),
            "runtime" => {}
            "slow" => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let _ = tx.send(Message::Text(echo(&request).to_string().into()));
                });
            }
            "noisy" => {
                let _ = tx.send(Message::Text(String::from("this is not json").into()));
                send(json!({ "result_code": 1, "result_msg": "", "result_data": { "power": 1 } }));
                send(json!({ "result_code": 1, "result_msg": "" }));
                send(reply("notice", json!({})));
                send(reply("noisy", json!({ "ok": true })));
            }
            "bye" => {
                let _ = tx.send(Message::Close(None));
                break;
            }
            _ => send(echo(&request)),
        }
    }
}

fn echo(request: &Value) -> Value {
    json!({ "result_code": 1, "result_msg": "success", "result_data": request })
}

// =============================================================================
// HTTP LOOKUPS
// =============================================================================

async fn about(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    Json(reply("about", json!({ "model": "WiNet-S", "lang": query.get("lang") })))
}

async fn products(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    Json(reply("product", json!({ "list": ["SH10RT"], "lang": query.get("lang") })))
}

async fn device_param(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    if query.get("token").map(String::as_str) != Some(TOKEN) {
        return Json(failure("param", "token error"));
    }
    Json(reply("param", json!({ "dev_id": query.get("dev_id") })))
}

async fn device_type(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    if query.get("token").map(String::as_str) != Some(TOKEN) {
        return Json(failure("type", "token error"));
    }
    Json(reply("type", json!({ "list": [{ "dev_type": 35, "name": "inverter" }] })))
}
