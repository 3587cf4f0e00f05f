//! In-process mock of the AFM Control API WebSocket server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use secrecy::SecretString;

use afm_control_client::config::ConnectionParams;

/// API key the mock server accepts.
pub const VALID_KEY: &str = "YOUR-SECRET-API-KEY-HERE";

/// How long the server waits for a pipelined request before replying.
const PIPELINE_WINDOW: Duration = Duration::from_millis(30);

/// Something the server observed on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A text request, verbatim.
    Request(String),
    /// A second request arrived before the first was answered.
    Pipelined(String),
    /// The client sent a close frame with this status.
    Closed(Option<u16>),
    /// The stream ended without a close frame.
    Ended,
}

/// Scripted deviations from the normal server behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Answers like the real server.
    Normal,
    /// Closes the connection with status 1008 right after rejecting a key.
    CloseOnReject,
    /// Answers `authenticate` with a binary frame.
    BinaryAuthReply,
    /// Closes with status 1011 instead of answering `authenticate`.
    CloseBeforeAuthReply,
    /// Drops the TCP connection right after the upgrade, without a close frame.
    DropAfterUpgrade,
}

#[derive(Debug, Clone)]
struct MockState {
    behavior: Behavior,
    log: EventLog,
}

/// Shared, append-only record of server events.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<ServerEvent>>>);

impl EventLog {
    fn record(&self, event: ServerEvent) {
        if let Ok(mut log) = self.0.lock() {
            log.push(event);
        }
    }

    /// Returns a copy of everything recorded so far.
    pub fn snapshot(&self) -> Vec<ServerEvent> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Returns only the text requests, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::Request(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Polls until the connection is over (closed or ended), or two seconds pass.
    pub async fn wait_for_disconnect(&self) -> Vec<ServerEvent> {
        for _ in 0..200 {
            let events = self.snapshot();
            if events
                .iter()
                .any(|e| matches!(e, ServerEvent::Closed(_) | ServerEvent::Ended))
            {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.snapshot()
    }
}

/// A running mock server.
#[derive(Debug)]
pub struct MockServer {
    /// Address the server listens on.
    pub addr: SocketAddr,
    /// Events observed by the server.
    pub log: EventLog,
}

impl MockServer {
    /// Starts a mock AFM server on an ephemeral port with the WebSocket
    /// endpoint mounted at `/`.
    pub async fn start(behavior: Behavior) -> Self {
        let log = EventLog::default();
        let state = MockState {
            behavior,
            log: log.clone(),
        };
        let app = Router::new().route("/", get(ws_handler)).with_state(state);
        let addr = serve(app).await;
        Self { addr, log }
    }

    /// Connection parameters pointing at this server.
    pub fn params(&self, api_key: &str) -> ConnectionParams {
        params_for(self.addr, api_key)
    }
}

/// Starts an HTTP server that has no WebSocket endpoint at `/`.
pub async fn start_plain_http() -> SocketAddr {
    let app = Router::new().route("/status", get(|| async { "ok" }));
    serve(app).await
}

/// Returns an address on which nothing is listening.
#[allow(clippy::panic)]
pub fn unused_addr() -> SocketAddr {
    let Ok(listener) = std::net::TcpListener::bind("127.0.0.1:0") else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    drop(listener);
    addr
}

/// Connection parameters for `addr`.
#[allow(clippy::panic)]
pub fn params_for(addr: SocketAddr, api_key: &str) -> ConnectionParams {
    let Ok(params) =
        ConnectionParams::new(SecretString::from(api_key.to_string()), "127.0.0.1", addr.port())
    else {
        panic!("valid params");
    };
    params
}

#[allow(clippy::panic)]
async fn serve(app: Router) -> SocketAddr {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            eprintln!("mock server stopped: {err}");
        }
    });
    addr
}

/// `GET /`: upgrade the HTTP connection to WebSocket.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<MockState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_connection(socket, state))
}

/// Serves one client: records every frame and answers each request.
async fn run_connection(mut socket: WebSocket, state: MockState) {
    if state.behavior == Behavior::DropAfterUpgrade {
        drop(socket);
        state.log.record(ServerEvent::Ended);
        return;
    }

    let mut authenticated = false;
    let mut pending: Option<Message> = None;

    loop {
        let msg = match pending.take() {
            Some(msg) => Some(Ok(msg)),
            None => socket.recv().await,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                state.log.record(ServerEvent::Request(text.as_str().to_string()));

                if let Ok(Some(Ok(next))) =
                    tokio::time::timeout(PIPELINE_WINDOW, socket.recv()).await
                {
                    if let Message::Text(ref early) = next {
                        state.log.record(ServerEvent::Pipelined(early.as_str().to_string()));
                    }
                    pending = Some(next);
                }

                let keep_open =
                    answer(&mut socket, &state, text.as_str(), &mut authenticated).await;
                if !keep_open {
                    break;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                state.log.record(ServerEvent::Closed(frame.map(|f| f.code)));
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(_)) | None => {
                state.log.record(ServerEvent::Ended);
                break;
            }
        }
    }
}

/// Sends the reply for one request. Returns `false` once the server has
/// closed the connection.
async fn answer(
    socket: &mut WebSocket,
    state: &MockState,
    text: &str,
    authenticated: &mut bool,
) -> bool {
    let request: serde_json::Value = serde_json::from_str(text).unwrap_or_default();
    let command = request.get("command").and_then(|v| v.as_str()).unwrap_or_default();

    match command {
        "authenticate" => {
            match state.behavior {
                Behavior::BinaryAuthReply => {
                    return socket.send(Message::binary(vec![0x4f, 0x4b])).await.is_ok();
                }
                Behavior::CloseBeforeAuthReply => {
                    close(socket, &state.log, 1011, "internal error").await;
                    return false;
                }
                Behavior::Normal | Behavior::CloseOnReject | Behavior::DropAfterUpgrade => {}
            }

            let key = request.get("apikey").and_then(|v| v.as_str());
            if key == Some(VALID_KEY) {
                *authenticated = true;
                send_json(
                    socket,
                    r#"{"command":"response","object":"Authenticated","payload":{"message":"OK"}}"#,
                )
                .await
            } else {
                let sent = send_json(
                    socket,
                    r#"{"command":"error","payload":{"details":"Invalid API key","title":"Unauthorized"}}"#,
                )
                .await;
                if state.behavior == Behavior::CloseOnReject {
                    close(socket, &state.log, 1008, "unauthorized").await;
                    return false;
                }
                sent
            }
        }
        "get" if !*authenticated => {
            send_json(
                socket,
                r#"{"command":"error","payload":{"details":"Not authenticated","title":"Unauthorized"}}"#,
            )
            .await
        }
        "get" if request.get("object").and_then(|v| v.as_str()) == Some("APIEcho") => {
            let reply = serde_json::json!({
                "command": "response",
                "object": "APIEcho",
                "payload": request.get("payload").cloned().unwrap_or_default(),
            });
            send_json(socket, &reply.to_string()).await
        }
        _ => {
            send_json(
                socket,
                r#"{"command":"error","payload":{"details":"Unknown command","title":"Bad Request"}}"#,
            )
            .await
        }
    }
}

async fn send_json(socket: &mut WebSocket, json: &str) -> bool {
    socket.send(Message::text(json.to_string())).await.is_ok()
}

/// Starts a server-side close and records how the client finished it.
async fn close(socket: &mut WebSocket, log: &EventLog, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    };
    if socket.send(Message::Close(Some(frame))).await.is_err() {
        log.record(ServerEvent::Ended);
        return;
    }
    match tokio::time::timeout(Duration::from_millis(500), socket.recv()).await {
        Ok(Some(Ok(Message::Close(ack)))) => log.record(ServerEvent::Closed(ack.map(|f| f.code))),
        _ => log.record(ServerEvent::Ended),
    }
}
