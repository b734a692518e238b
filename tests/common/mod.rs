//! Shared utilities for integration tests: an in-process mock of the
//! external store and its push channel.

#![allow(dead_code)]

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

#[derive(Default)]
struct Inner {
    records: Mutex<HashMap<String, Vec<Value>>>,
    received: Mutex<Vec<String>>,
    ws_enabled: AtomicBool,
    list_calls: AtomicUsize,
    open_sockets: AtomicUsize,
}

#[derive(Clone)]
struct AppState {
    inner: Arc<Inner>,
    frames: broadcast::Sender<(String, String)>,
    kick: broadcast::Sender<()>,
}

/// Mock store listening on an ephemeral port.
pub struct MockStore {
    pub addr: SocketAddr,
    state: AppState,
}

impl MockStore {
    pub async fn start() -> Self {
        let (frames, _) = broadcast::channel(64);
        let (kick, _) = broadcast::channel(4);
        let state = AppState {
            inner: Arc::new(Inner::default()),
            frames,
            kick,
        };
        state.inner.ws_enabled.store(true, Ordering::SeqCst);

        let app = Router::new()
            .route("/api/endpoints/{id}", get(get_endpoint))
            .route(
                "/api/endpoints/{id}/requests",
                get(list_requests).delete(clear_requests),
            )
            .route("/api/endpoints/{id}/requests/{rid}", delete(delete_request))
            .route("/api/ws/{id}", get(channel))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Store a record without announcing it.
    pub fn insert(&self, endpoint: &str, record: Value) {
        self.state
            .inner
            .records
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push(record);
    }

    /// Store a record and push it on the endpoint's channel.
    pub fn capture(&self, endpoint: &str, record: Value) {
        self.insert(endpoint, record.clone());
        self.push(endpoint, json!({"type": "new_request", "data": record}).to_string());
    }

    /// Push a raw frame to every socket open on `endpoint`.
    pub fn push(&self, endpoint: &str, frame: impl Into<String>) {
        let _ = self.state.frames.send((endpoint.to_string(), frame.into()));
    }

    /// Refuse (503) or accept channel upgrades.
    pub fn set_ws_enabled(&self, enabled: bool) {
        self.state.inner.ws_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Close every open socket from the server side.
    pub fn drop_connections(&self) {
        let _ = self.state.kick.send(());
    }

    pub fn list_calls(&self) -> usize {
        self.state.inner.list_calls.load(Ordering::SeqCst)
    }

    pub fn open_sockets(&self) -> usize {
        self.state.inner.open_sockets.load(Ordering::SeqCst)
    }

    /// Text frames received from clients.
    pub fn received(&self) -> Vec<String> {
        self.state.inner.received.lock().unwrap().clone()
    }

    pub fn record_ids(&self, endpoint: &str) -> Vec<u64> {
        self.state
            .inner
            .records
            .lock()
            .unwrap()
            .get(endpoint)
            .map(|records| records.iter().filter_map(|r| r["id"].as_u64()).collect())
            .unwrap_or_default()
    }
}

/// A store row for request `id`; later ids are received later.
pub fn record(endpoint: &str, id: u64) -> Value {
    json!({
        "id": id,
        "endpoint_id": endpoint,
        "method": "POST",
        "path": format!("/webhook/{}", endpoint),
        "query_string": "",
        "headers": "{\"Content-Type\":\"application/json\",\"X-Delivery\":\"abc\"}",
        "body": format!("{{\"n\":{}}}", id),
        "content_type": "application/json",
        "received_at": format!("2024-01-01 00:{:02}:{:02}", id / 60, id % 60),
        "ip_address": "127.0.0.1"
    })
}

/// Poll `check` every 20ms until it holds or `within` elapses.
pub async fn eventually<F, Fut>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn list_requests(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    state.inner.list_calls.fetch_add(1, Ordering::SeqCst);
    let mut records = state
        .inner
        .records
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .unwrap_or_default();
    records.sort_by_key(|r| std::cmp::Reverse(r["id"].as_u64()));
    let total = records.len();
    Json(json!({"requests": records, "total": total, "page": 1, "limit": 50}))
}

async fn get_endpoint(State(state): State<AppState>, Path(id): Path<String>) -> Json<Value> {
    let count = state
        .inner
        .records
        .lock()
        .unwrap()
        .get(&id)
        .map_or(0, Vec::len);
    Json(json!({
        "id": id,
        "created_at": "2024-01-01 00:00:00",
        "custom_response_enabled": false,
        "response_status": 200,
        "response_headers": "{}",
        "response_body": null,
        "request_count": count
    }))
}

async fn delete_request(
    State(state): State<AppState>,
    Path((id, rid)): Path<(String, u64)>,
) -> StatusCode {
    let mut records = state.inner.records.lock().unwrap();
    let Some(list) = records.get_mut(&id) else {
        return StatusCode::NOT_FOUND;
    };
    let before = list.len();
    list.retain(|r| r["id"].as_u64() != Some(rid));
    if list.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn clear_requests(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    state.inner.records.lock().unwrap().remove(&id);
    StatusCode::NO_CONTENT
}

async fn channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if !state.inner.ws_enabled.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    // Subscribe before the upgrade completes so no frame pushed after the
    // client sees the channel open is missed.
    let frames = state.frames.subscribe();
    let kick = state.kick.subscribe();
    ws.on_upgrade(move |socket| serve_socket(socket, id, state, frames, kick))
}

async fn serve_socket(
    mut socket: WebSocket,
    endpoint: String,
    state: AppState,
    mut frames: broadcast::Receiver<(String, String)>,
    mut kick: broadcast::Receiver<()>,
) {
    state.inner.open_sockets.fetch_add(1, Ordering::SeqCst);
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok((target, text)) if target == endpoint => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = kick.recv() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    state.inner.received.lock().unwrap().push(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    state.inner.open_sockets.fetch_sub(1, Ordering::SeqCst);
}
