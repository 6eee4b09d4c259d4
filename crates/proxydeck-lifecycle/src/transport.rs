//! WebSocket client for the terminal bridge.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use proxydeck_automation::{AutomationError, KeySink};
use proxydeck_common::{ClientMessage, ProxydeckError, ServerMessage, SessionId, TermSize};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// How long to wait for the handshake and the `ready` greeting.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Something the server told us about the session's shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Output(Vec<u8>),
    /// The shell exited on its own; a new `start` spawns a fresh one.
    Exit(Option<u32>),
}

/// One connection to the bridge, i.e. one terminal session.
///
/// Outbound messages go through a write pump task, inbound frames are
/// decoded by a read task, so sending never waits on output and vice versa.
pub struct TerminalClient {
    session_id: SessionId,
    outbound: mpsc::UnboundedSender<Message>,
    events: Mutex<mpsc::UnboundedReceiver<TerminalEvent>>,
}

impl TerminalClient {
    pub async fn connect(url: &str) -> Result<Self, ProxydeckError> {
        Self::connect_with_timeout(url, READY_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        url: &str,
        ready_timeout: Duration,
    ) -> Result<Self, ProxydeckError> {
        let (ws, _) = tokio::time::timeout(ready_timeout, connect_async(url))
            .await
            .map_err(|_| ProxydeckError::Transport(format!("connect to {url} timed out")))?
            .map_err(|e| ProxydeckError::Transport(format!("connect to {url} failed: {e}")))?;

        let (mut sink, mut stream) = ws.split();

        let session_id = tokio::time::timeout(ready_timeout, read_ready(&mut stream))
            .await
            .map_err(|_| ProxydeckError::Transport("no ready message from server".into()))??;
        tracing::info!(url = %url, session = %session_id, "terminal connected");

        // Write pump
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if sink.send(msg).await.is_err() || closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Read loop
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = session_id.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg @ ServerMessage::Output { .. }) => {
                            match msg.output_bytes() {
                                Some(bytes) => {
                                    if events_tx.send(TerminalEvent::Output(bytes)).is_err() {
                                        break;
                                    }
                                }
                                None => tracing::debug!("undecodable output frame ignored"),
                            }
                        }
                        Ok(ServerMessage::Exit { code }) => {
                            let _ = events_tx.send(TerminalEvent::Exit(code));
                        }
                        Ok(ServerMessage::Pong) | Ok(ServerMessage::Ready { .. }) => {}
                        Err(e) => tracing::debug!(error = %e, "malformed server frame ignored"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "terminal connection error");
                        break;
                    }
                }
            }
            tracing::info!(session = %session, "terminal disconnected");
        });

        Ok(Self {
            session_id,
            outbound,
            events: Mutex::new(events_rx),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    fn send(&self, msg: &ClientMessage) -> Result<(), ProxydeckError> {
        self.send_frame(Message::Text(msg.to_json().into()))
    }

    fn send_frame(&self, frame: Message) -> Result<(), ProxydeckError> {
        self.outbound
            .send(frame)
            .map_err(|_| ProxydeckError::Transport("connection closed".into()))
    }

    /// Ask the server to spawn the shell. Idempotent.
    pub fn start(&self) -> Result<(), ProxydeckError> {
        self.send(&ClientMessage::Start)
    }

    pub fn send_input(&self, data: &str) -> Result<(), ProxydeckError> {
        self.send(&ClientMessage::Input {
            data: data.to_string(),
        })
    }

    /// Send raw bytes that need not be valid UTF-8.
    pub fn send_bytes(&self, data: &[u8]) -> Result<(), ProxydeckError> {
        self.send_frame(Message::Binary(data.to_vec().into()))
    }

    pub fn resize(&self, size: TermSize) -> Result<(), ProxydeckError> {
        self.send(&ClientMessage::Resize {
            cols: size.cols,
            rows: size.rows,
        })
    }

    pub fn ping(&self) -> Result<(), ProxydeckError> {
        self.send(&ClientMessage::Ping)
    }

    /// Type a command line and press Enter.
    pub fn run_command(&self, command: &str) -> Result<(), ProxydeckError> {
        self.send_input(&format!("{command}\r"))
    }

    /// Next event, or `None` once the connection is gone.
    pub async fn next_event(&self) -> Option<TerminalEvent> {
        self.events.lock().await.recv().await
    }

    /// Next chunk of shell output, skipping exit notices.
    pub async fn next_output(&self) -> Option<Vec<u8>> {
        let mut events = self.events.lock().await;
        loop {
            match events.recv().await? {
                TerminalEvent::Output(bytes) => return Some(bytes),
                TerminalEvent::Exit(code) => {
                    tracing::debug!(?code, "shell exited");
                }
            }
        }
    }

    /// Close the connection. The server terminates the session's shell.
    pub fn close(&self) {
        let _ = self.send_frame(Message::Close(None));
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

#[async_trait]
impl KeySink for TerminalClient {
    async fn send_keys(&self, data: &[u8]) -> Result<(), AutomationError> {
        let result = match std::str::from_utf8(data) {
            Ok(text) => self.send_input(text),
            Err(_) => self.send_bytes(data),
        };
        result.map_err(|e| AutomationError::Transport(e.to_string()))
    }
}

async fn read_ready(
    stream: &mut futures_util::stream::SplitStream<WsStream>,
) -> Result<SessionId, ProxydeckError> {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if let Ok(ServerMessage::Ready { session_id }) =
                    serde_json::from_str::<ServerMessage>(&text)
                {
                    return Ok(session_id);
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => return Err(ProxydeckError::Transport(e.to_string())),
        }
    }
    Err(ProxydeckError::Transport(
        "connection closed before ready".into(),
    ))
}
