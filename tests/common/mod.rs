// Common test utilities for integration tests
// Runs a scriptable in-process stand-in for the chat backend: the REST
// gateway answers from per-path reply queues and records every request,
// the /ws route hands each accepted socket to the test as a peer handle.

// Standard library imports
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

// External crate imports
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use log::LevelFilter;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

// Import the crate functionality
use helpline::{Session, ViewDelta};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .init();
    });
}

/// One canned answer for a REST path.
#[derive(Debug)]
pub enum Reply {
    /// 200 with this JSON body.
    Json(Value),
    /// Bare status with an empty body.
    Status(u16),
}

/// What one REST call looked like when it arrived.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub request_id: Option<String>,
    pub bearer: Option<String>,
    pub body: Value,
}

/// Instruction from the test to an accepted websocket.
enum Directive {
    Send(String),
    /// Close handshake with this code.
    Close(u16),
    /// Drop the connection with no close frame, like a dying server.
    Abort,
}

/// Frame the connected client sent to the server.
#[derive(Debug, PartialEq)]
pub enum ClientFrame {
    Text(String),
    Close(Option<u16>),
}

/// Test-side handle to one accepted websocket connection.
pub struct WsPeer {
    /// Raw `Sec-WebSocket-Protocol` offer from the handshake.
    pub offer: Option<String>,
    directives: mpsc::UnboundedSender<Directive>,
    frames: mpsc::UnboundedReceiver<ClientFrame>,
}

impl WsPeer {
    pub fn send_json(&self, frame: Value) {
        let _ = self.directives.send(Directive::Send(frame.to_string()));
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.directives.send(Directive::Send(text.into()));
    }

    /// Server-initiated close handshake with the given code.
    pub fn close(&self, code: u16) {
        let _ = self.directives.send(Directive::Close(code));
    }

    /// Kills the connection without a close frame.
    pub fn abort(&self) {
        let _ = self.directives.send(Directive::Abort);
    }

    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        timeout(Duration::from_secs(2), self.frames.recv())
            .await
            .ok()
            .flatten()
    }
}

struct BackendState {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    accepted: mpsc::UnboundedSender<WsPeer>,
}

/// In-process backend double bound to an ephemeral port.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    accepted: mpsc::UnboundedReceiver<WsPeer>,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let state = Arc::new(BackendState {
            replies: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            accepted: accepted_tx,
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/*path", post(api_handler))
            .with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test backend");
        let addr = listener.local_addr().expect("test backend address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        FakeBackend {
            addr,
            state,
            accepted: accepted_rx,
        }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Queues the next reply for `path`. Replies are consumed in order;
    /// an unscripted call is answered with an application error so the
    /// failing path shows up in the test output.
    pub fn script(&self, path: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    /// Next accepted websocket connection, or a panic after two seconds.
    pub async fn expect_ws(&mut self) -> WsPeer {
        timeout(Duration::from_secs(2), self.accepted.recv())
            .await
            .expect("timed out waiting for a websocket connection")
            .expect("backend is gone")
    }

    /// True when no new websocket connection arrives within `window`.
    pub async fn no_ws_within(&mut self, window: Duration) -> bool {
        timeout(window, self.accepted.recv()).await.is_err()
    }
}

async fn api_handler(
    State(state): State<Arc<BackendState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let path = format!("/{path}");
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    state.requests.lock().unwrap().push(RecordedRequest {
        path: path.clone(),
        request_id: header("x-request-id"),
        bearer: header("authorization"),
        body,
    });

    let reply = state
        .replies
        .lock()
        .unwrap()
        .get_mut(&path)
        .and_then(|queue| queue.pop_front());
    match reply {
        Some(Reply::Json(value)) => Json(value).into_response(),
        Some(Reply::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        None => Json(json!({
            "error": { "code": 500, "message": format!("no scripted response for {path}") }
        }))
        .into_response(),
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
) -> Response {
    let offer = headers
        .get("sec-websocket-protocol")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    // Select the subprotocol entry of the offer, like the real backend.
    ws.protocols(["chat-service-protocol"])
        .on_upgrade(move |socket| serve_socket(socket, state, offer))
}

async fn serve_socket(socket: WebSocket, state: Arc<BackendState>, offer: Option<String>) {
    let (directive_tx, mut directives) = mpsc::unbounded_channel();
    let (frame_tx, frames) = mpsc::unbounded_channel();
    let peer = WsPeer {
        offer,
        directives: directive_tx,
        frames,
    };
    if state.accepted.send(peer).is_err() {
        return;
    }

    let (mut sink, mut source) = socket.split();
    loop {
        tokio::select! {
            directive = directives.recv() => match directive {
                Some(Directive::Send(text)) => {
                    if sink.send(WsMessage::Text(text)).await.is_err() {
                        return;
                    }
                }
                Some(Directive::Close(code)) => {
                    let frame = CloseFrame {
                        code,
                        reason: "".into(),
                    };
                    let _ = sink.send(WsMessage::Close(Some(frame))).await;
                    return;
                }
                Some(Directive::Abort) | None => return,
            },
            frame = source.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let _ = frame_tx.send(ClientFrame::Text(text));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let _ = frame_tx.send(ClientFrame::Close(frame.map(|frame| frame.code)));
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
        }
    }
}

/// Deterministic uuid for fixtures.
pub fn uid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

/// Everything a core has narrated so far, without blocking.
pub fn drain(feed: &mut mpsc::UnboundedReceiver<ViewDelta>) -> Vec<ViewDelta> {
    let mut seen = Vec::new();
    while let Ok(delta) = feed.try_recv() {
        seen.push(delta);
    }
    seen
}

/// Timestamps a minute apart, so page fixtures sort predictably.
pub fn timestamp(minute: u32) -> String {
    format!("2024-06-01T10:{minute:02}:00Z")
}

/// Unsigned JWT whose subject is `sub`, enough for `Session::from_token`.
pub fn test_token(sub: Uuid) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}"}}"#));
    format!("{header}.{payload}.sig")
}

pub fn test_session(sub: Uuid) -> Session {
    Session::from_token(test_token(sub)).expect("test token decodes")
}

// ---- wire fixtures -------------------------------------------------------

pub fn data(value: Value) -> Reply {
    Reply::Json(json!({ "data": value }))
}

pub fn ack() -> Reply {
    Reply::Json(json!({ "data": null }))
}

pub fn app_error(code: i32, message: &str) -> Reply {
    Reply::Json(json!({ "error": { "code": code, "message": message } }))
}

pub fn message_json(id: Uuid, author_id: Option<Uuid>, body: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "authorId": author_id,
        "body": body,
        "createdAt": created_at,
        "isService": false,
        "isBlocked": false,
        "isReceived": false,
    })
}

/// `messages` newest first, exactly as the backend pages them.
pub fn page_json(messages: Vec<Value>, next: Option<&str>) -> Value {
    json!({ "messages": messages, "next": next })
}

pub fn chat_json(chat_id: Uuid, client_id: Uuid) -> Value {
    json!({ "chatId": chat_id, "clientId": client_id })
}

pub fn new_message_event(id: Uuid, author_id: Option<Uuid>, body: &str, created_at: &str) -> Value {
    json!({
        "eventType": "NewMessageEvent",
        "eventId": Uuid::new_v4(),
        "messageId": id,
        "authorId": author_id,
        "body": body,
        "createdAt": created_at,
        "isService": false,
    })
}
