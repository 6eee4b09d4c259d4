//! In-process stand-ins for the proxy HTTP API and the bridge server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use proxydeck_common::{ClientMessage, ServerMessage, SessionId};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

// =============================================================================
// FAKE PROXY (HTTP)
// =============================================================================

#[derive(Default)]
struct ProxyState {
    health_status: u16,
    api_keys: Vec<String>,
    health_hits: usize,
}

/// Minimal HTTP/1.1 server answering the proxy's probe endpoints.
pub(crate) struct FakeProxy {
    addr: SocketAddr,
    state: Arc<Mutex<ProxyState>>,
    task: JoinHandle<()>,
}

impl FakeProxy {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(ProxyState {
            health_status: 200,
            ..ProxyState::default()
        }));

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = Arc::clone(&task_state);
                tokio::spawn(serve_http(stream, state));
            }
        });

        Self { addr, state, task }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    pub(crate) fn set_health_status(&self, status: u16) {
        self.state.lock().unwrap().health_status = status;
    }

    pub(crate) fn saw_api_key(&self, key: &str) -> bool {
        self.state.lock().unwrap().api_keys.iter().any(|k| k == key)
    }

    pub(crate) fn health_hits(&self) -> usize {
        self.state.lock().unwrap().health_hits
    }
}

impl Drop for FakeProxy {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_http(mut stream: TcpStream, state: Arc<Mutex<ProxyState>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let request = String::from_utf8_lossy(&buf).into_owned();
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let api_key = request.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("x-api-key")
            .then(|| value.trim().to_string())
    });

    let (status, body) = {
        let mut state = state.lock().unwrap();
        if let Some(key) = api_key {
            state.api_keys.push(key);
        }
        match path.as_str() {
            "/health" => {
                state.health_hits += 1;
                (state.health_status, r#"{"status":"ok"}"#.to_string())
            }
            "/v1/models" => (
                200,
                r#"{"object":"list","data":[{"id":"claude-sonnet-4"},{"id":"gemini-2.5-pro"}]}"#
                    .to_string(),
            ),
            "/account-limits" => (
                200,
                r#"{"accounts":[{"email":"a@x.com","remaining":42}]}"#.to_string(),
            ),
            _ => (404, "{}".to_string()),
        }
    };

    let response = format!(
        "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

// =============================================================================
// FAKE BRIDGE (WEBSOCKET)
// =============================================================================

/// WebSocket server that greets with `ready`, records client messages and
/// lets the test push server messages.
pub(crate) struct FakeBridge {
    addr: SocketAddr,
    received: mpsc::UnboundedReceiver<ClientMessage>,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    task: JoinHandle<()>,
}

impl FakeBridge {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let outbound_rx = Arc::new(tokio::sync::Mutex::new(outbound_rx));

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let received_tx = received_tx.clone();
                let outbound_rx = Arc::clone(&outbound_rx);
                tokio::spawn(async move {
                    let (mut sink, mut stream) = ws.split();
                    let ready = ServerMessage::Ready {
                        session_id: SessionId::from("fake-session"),
                    };
                    if sink.send(Message::Text(ready.to_json().into())).await.is_err() {
                        return;
                    }
                    let mut outbound_rx = outbound_rx.lock().await;
                    loop {
                        tokio::select! {
                            Some(msg) = outbound_rx.recv() => {
                                if sink.send(Message::Text(msg.to_json().into())).await.is_err() {
                                    break;
                                }
                            }
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) {
                                        let _ = received_tx.send(msg);
                                    }
                                }
                                Some(Ok(Message::Binary(data))) => {
                                    let data = String::from_utf8_lossy(&data).into_owned();
                                    let _ = received_tx.send(ClientMessage::Input { data });
                                }
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                _ => {}
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            received,
            outbound,
            task,
        }
    }

    pub(crate) fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub(crate) fn send(&self, msg: ServerMessage) {
        let _ = self.outbound.send(msg);
    }

    /// Next message from the client, or `None` after 5 s of silence.
    pub(crate) async fn next_message(&mut self) -> Option<ClientMessage> {
        tokio::time::timeout(Duration::from_secs(5), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Whatever the client has sent so far, without waiting.
    pub(crate) fn drain(&mut self) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.received.try_recv() {
            out.push(msg);
        }
        out
    }
}

impl Drop for FakeBridge {
    fn drop(&mut self) {
        self.task.abort();
    }
}
