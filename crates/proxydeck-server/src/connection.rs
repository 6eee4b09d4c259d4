//! Per-connection handler: greet, then bridge messages to one PTY session.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use proxydeck_common::{ClientMessage, ServerMessage, SessionId, TermSize};
use proxydeck_pty::{PtyEvent, SessionManager, SpawnOptions, StartedSession};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type Outbound = mpsc::UnboundedSender<Message>;

/// Handle a single WebSocket connection: one connection, one session.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    sessions: SessionManager,
    spawn: Arc<SpawnOptions>,
) {
    let session = SessionId::new();
    let (mut sink, mut stream) = ws.split();

    // Write pump
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let pump = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tracing::info!(peer = %addr, session = %session, "client connected");
    send(
        &out_tx,
        &ServerMessage::Ready {
            session_id: session.clone(),
        },
    );

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Start) => start_shell(&sessions, &session, &spawn, &out_tx).await,
                Ok(ClientMessage::Input { data }) => {
                    sessions.write(&session, data.as_bytes()).await;
                }
                Ok(ClientMessage::Resize { cols, rows }) => {
                    sessions.resize(&session, TermSize::new(cols, rows)).await;
                }
                Ok(ClientMessage::Ping) => send(&out_tx, &ServerMessage::Pong),
                Err(e) => {
                    tracing::debug!(session = %session, error = %e, "malformed frame ignored");
                }
            },
            Ok(Message::Binary(data)) => sessions.write(&session, &data).await,
            Ok(Message::Ping(data)) => {
                let _ = out_tx.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(peer = %addr, error = %e, "WS error");
                break;
            }
        }
    }

    // Cleanup
    let code = sessions.terminate(&session).await;
    tracing::info!(peer = %addr, session = %session, ?code, "client disconnected");
    drop(out_tx);
    let _ = pump.await;
}

async fn start_shell(
    sessions: &SessionManager,
    session: &SessionId,
    spawn: &SpawnOptions,
    out_tx: &Outbound,
) {
    match sessions.start(session, spawn).await {
        Ok(Some(started)) => {
            tokio::spawn(relay_output(
                sessions.clone(),
                session.clone(),
                started,
                out_tx.clone(),
            ));
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(session = %session, error = %e, "failed to spawn shell");
        }
    }
}

/// Forward one shell's output in read order, then report its exit.
async fn relay_output(
    sessions: SessionManager,
    session: SessionId,
    started: StartedSession,
    out_tx: Outbound,
) {
    let StartedSession {
        generation,
        mut events,
    } = started;

    while let Some(event) = events.recv().await {
        match event {
            PtyEvent::Output(bytes) => {
                if out_tx
                    .send(Message::Text(ServerMessage::output(&bytes).to_json().into()))
                    .is_err()
                {
                    tracing::debug!(session = %session, "output dropped, connection gone");
                    break;
                }
            }
            PtyEvent::Closed => {
                if let Some(exit) = sessions.reap(&session, generation).await {
                    send(&out_tx, &ServerMessage::Exit { code: exit.code });
                }
                break;
            }
        }
    }
}

fn send(out_tx: &Outbound, msg: &ServerMessage) {
    if out_tx.send(Message::Text(msg.to_json().into())).is_err() {
        tracing::debug!("send on closed connection");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::server::Bridge;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, MaybeTlsStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn bridge() -> (String, SessionManager) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let spawn = SpawnOptions::default()
            .with_program("/bin/sh")
            .with_env("PS1", "$ ");
        let bridge = Bridge::new(SessionManager::new(), spawn, Duration::from_secs(5));
        let sessions = bridge.sessions().clone();
        tokio::spawn(bridge.serve(listener));
        (url, sessions)
    }

    async fn recv(ws: &mut Client) -> ServerMessage {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(10), ws.next())
                .await
                .expect("timed out waiting for server")
                .expect("connection closed")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn send_msg(ws: &mut Client, msg: ClientMessage) {
        ws.send(Message::Text(msg.to_json().into())).await.unwrap();
    }

    async fn connect(url: &str) -> (Client, SessionId) {
        let (mut ws, _) = connect_async(url).await.unwrap();
        let ServerMessage::Ready { session_id } = recv(&mut ws).await else {
            panic!("expected ready first");
        };
        (ws, session_id)
    }

    /// Collect output until `needle` shows up, returning everything seen.
    async fn read_until(ws: &mut Client, needle: &str) -> String {
        let mut seen = Vec::new();
        loop {
            match recv(ws).await {
                msg @ ServerMessage::Output { .. } => {
                    seen.extend(msg.output_bytes().unwrap());
                    let text = String::from_utf8_lossy(&seen);
                    if text.contains(needle) {
                        return text.into_owned();
                    }
                }
                ServerMessage::Exit { .. } => panic!("shell exited before `{needle}`"),
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn ready_then_ping_pong() {
        let (url, _) = bridge().await;
        let (mut ws, id) = connect(&url).await;
        assert!(!id.as_str().is_empty());

        send_msg(&mut ws, ClientMessage::Ping).await;
        assert_eq!(recv(&mut ws).await, ServerMessage::Pong);
    }

    #[tokio::test]
    async fn input_reaches_shell_and_output_comes_back() {
        let (url, sessions) = bridge().await;
        let (mut ws, id) = connect(&url).await;

        send_msg(&mut ws, ClientMessage::Start).await;
        send_msg(&mut ws, ClientMessage::Start).await;
        send_msg(
            &mut ws,
            ClientMessage::Input {
                data: "echo bridge-$((40+2))\r".into(),
            },
        )
        .await;

        read_until(&mut ws, "bridge-42").await;
        assert!(sessions.is_live(&id).await);
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn binary_frames_are_raw_input() {
        let (url, _) = bridge().await;
        let (mut ws, _) = connect(&url).await;

        send_msg(&mut ws, ClientMessage::Start).await;
        ws.send(Message::Binary(b"echo raw-$((6*7))\r".to_vec().into()))
            .await
            .unwrap();
        read_until(&mut ws, "raw-42").await;
    }

    #[tokio::test]
    async fn resize_before_start_is_ignored_then_applies() {
        let (url, sessions) = bridge().await;
        let (mut ws, id) = connect(&url).await;

        send_msg(&mut ws, ClientMessage::Resize { cols: 120, rows: 40 }).await;
        send_msg(&mut ws, ClientMessage::Ping).await;
        assert_eq!(recv(&mut ws).await, ServerMessage::Pong);
        assert!(!sessions.is_live(&id).await);

        send_msg(&mut ws, ClientMessage::Start).await;
        send_msg(&mut ws, ClientMessage::Resize { cols: 120, rows: 40 }).await;
        send_msg(
            &mut ws,
            ClientMessage::Input {
                data: "stty size\r".into(),
            },
        )
        .await;
        read_until(&mut ws, "40 120").await;
        assert_eq!(sessions.size(&id).await, Some(TermSize::new(120, 40)));
    }

    #[tokio::test]
    async fn shell_exit_is_reported_and_restartable() {
        let (url, sessions) = bridge().await;
        let (mut ws, id) = connect(&url).await;

        send_msg(&mut ws, ClientMessage::Start).await;
        send_msg(
            &mut ws,
            ClientMessage::Input {
                data: "exit 3\r".into(),
            },
        )
        .await;
        loop {
            if let ServerMessage::Exit { code } = recv(&mut ws).await {
                assert_eq!(code, Some(3));
                break;
            }
        }
        assert!(!sessions.is_live(&id).await);

        send_msg(&mut ws, ClientMessage::Start).await;
        send_msg(
            &mut ws,
            ClientMessage::Input {
                data: "echo again-$((1+1))\r".into(),
            },
        )
        .await;
        read_until(&mut ws, "again-2").await;
    }

    #[tokio::test]
    async fn large_output_arrives_exactly_once_in_order() {
        let (url, _) = bridge().await;
        let (mut ws, _) = connect(&url).await;

        send_msg(&mut ws, ClientMessage::Start).await;
        // printf markers so the echoed command line never matches them
        send_msg(
            &mut ws,
            ClientMessage::Input {
                data: "printf 'BEGIN_%s\\n' X; seq 1 40000; printf 'END_%s\\n' X\r".into(),
            },
        )
        .await;
        let output = read_until(&mut ws, "END_X").await;

        let start = output.find("BEGIN_X").expect("begin marker") + "BEGIN_X".len();
        let end = output.find("END_X").expect("end marker");
        let lines: Vec<&str> = output[start..end]
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .collect();
        let expected: Vec<String> = (1..=40000).map(|n| n.to_string()).collect();
        assert_eq!(lines.len(), expected.len());
        assert!(lines.iter().zip(&expected).all(|(got, want)| got == want));
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let (url, _) = bridge().await;
        let (mut ws, _) = connect(&url).await;

        ws.send(Message::Text("not json".into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"launch"}"#.into()))
            .await
            .unwrap();
        send_msg(&mut ws, ClientMessage::Ping).await;
        assert_eq!(recv(&mut ws).await, ServerMessage::Pong);
    }

    #[tokio::test]
    async fn closing_connection_terminates_shell() {
        let (url, sessions) = bridge().await;
        let (mut ws, id) = connect(&url).await;

        send_msg(&mut ws, ClientMessage::Start).await;
        send_msg(
            &mut ws,
            ClientMessage::Input {
                data: "echo up\r".into(),
            },
        )
        .await;
        read_until(&mut ws, "up").await;
        ws.close(None).await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while sessions.is_live(&id).await && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!sessions.is_live(&id).await);
    }

    #[tokio::test]
    async fn connections_get_separate_sessions() {
        let (url, sessions) = bridge().await;
        let (mut a, id_a) = connect(&url).await;
        let (mut b, id_b) = connect(&url).await;
        assert_ne!(id_a, id_b);

        send_msg(&mut a, ClientMessage::Start).await;
        send_msg(&mut b, ClientMessage::Start).await;
        send_msg(
            &mut a,
            ClientMessage::Input {
                data: "echo only-$((1+0))-a\r".into(),
            },
        )
        .await;
        send_msg(
            &mut b,
            ClientMessage::Input {
                data: "echo only-$((1+1))-b\r".into(),
            },
        )
        .await;

        let out_a = read_until(&mut a, "only-1-a").await;
        let out_b = read_until(&mut b, "only-2-b").await;
        assert!(!out_a.contains("only-2-b"));
        assert!(!out_b.contains("only-1-a"));
        assert_eq!(sessions.len().await, 2);
    }
}
