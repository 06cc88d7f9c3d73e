//! In-process STOMP broker for exercising the connection manager over a
//! real WebSocket.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use patientflow_realtime::frame::{is_heartbeat, parse_client_frames, Command, Frame};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

/// How long a test waits for an expected frame or session.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(10);

enum Outbound {
    Text(String),
    Close,
}

/// Accepts client connections and hands each one to the test.
pub struct MockBroker {
    pub addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<BrokerSession>,
}

/// The broker side of one client connection.
pub struct BrokerSession {
    inbound: mpsc::UnboundedReceiver<Frame>,
    /// Arrival time of each heart-beat EOL from the client.
    heartbeats: mpsc::UnboundedReceiver<Instant>,
    outbound: mpsc::UnboundedSender<Outbound>,
    next_message_id: u64,
}

impl MockBroker {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let (inbound_tx, inbound) = mpsc::unbounded_channel();
                let (heartbeat_tx, heartbeats) = mpsc::unbounded_channel();
                let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
                let _ = session_tx.send(BrokerSession {
                    inbound,
                    heartbeats,
                    outbound,
                    next_message_id: 0,
                });

                tokio::spawn(async move {
                    let (mut sink, mut stream) = ws.split();
                    loop {
                        tokio::select! {
                            incoming = stream.next() => match incoming {
                                Some(Ok(Message::Text(text))) if is_heartbeat(&text) => {
                                    let _ = heartbeat_tx.send(Instant::now());
                                }
                                Some(Ok(Message::Text(text))) => {
                                    for frame in parse_client_frames(&text).into_iter().flatten() {
                                        let _ = inbound_tx.send(frame);
                                    }
                                }
                                Some(Ok(_)) => {}
                                _ => break,
                            },
                            out = outbound_rx.recv() => match out {
                                Some(Outbound::Text(text)) => {
                                    if sink.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Some(Outbound::Close) | None => {
                                    let _ = sink.close().await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self { addr, sessions }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws-queue", self.addr)
    }

    pub async fn next_session(&mut self) -> BrokerSession {
        self.next_session_within(STEP_TIMEOUT).await
    }

    pub async fn next_session_within(&mut self, limit: Duration) -> BrokerSession {
        tokio::time::timeout(limit, self.sessions.recv())
            .await
            .expect("client should connect")
            .expect("broker accept loop ended")
    }
}

impl BrokerSession {
    pub async fn expect_frame(&mut self) -> Frame {
        tokio::time::timeout(STEP_TIMEOUT, self.inbound.recv())
            .await
            .expect("client should send a frame")
            .expect("client connection closed")
    }

    pub async fn expect_command(&mut self, command: Command) -> Frame {
        let frame = self.expect_frame().await;
        assert_eq!(frame.command, command, "unexpected frame: {frame:?}");
        frame
    }

    /// Wait for CONNECT and answer CONNECTED with heart-beats disabled.
    pub async fn handshake(&mut self) -> Frame {
        self.handshake_with_heart_beat("0,0").await
    }

    /// Wait for CONNECT and answer CONNECTED with the given `heart-beat`.
    pub async fn handshake_with_heart_beat(&mut self, heart_beat: &str) -> Frame {
        let connect = self.expect_command(Command::Connect).await;
        self.send(
            Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", heart_beat),
        );
        connect
    }

    /// Wait for the next heart-beat EOL and return when it arrived.
    pub async fn expect_heartbeat(&mut self) -> Instant {
        tokio::time::timeout(STEP_TIMEOUT, self.heartbeats.recv())
            .await
            .expect("client should send a heart-beat")
            .expect("client connection closed")
    }

    /// Wait for a SUBSCRIBE to `destination` and return its id.
    pub async fn expect_subscribe(&mut self, destination: &str) -> String {
        let frame = self.expect_command(Command::Subscribe).await;
        assert_eq!(frame.get("destination"), Some(destination));
        frame.get("id").expect("SUBSCRIBE must carry an id").to_string()
    }

    /// Assert the client stays quiet for a short while.
    pub async fn expect_silence(&mut self) {
        let quiet = tokio::time::timeout(Duration::from_millis(300), self.inbound.recv()).await;
        assert!(quiet.is_err(), "unexpected frame: {quiet:?}");
    }

    pub fn send(&self, frame: Frame) {
        let _ = self.outbound.send(Outbound::Text(frame.encode()));
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.outbound.send(Outbound::Text(text.to_string()));
    }

    pub fn publish(&mut self, destination: &str, subscription: &str, body: &str) {
        self.next_message_id += 1;
        self.send(
            Frame::new(Command::Message)
                .header("destination", destination)
                .header("subscription", subscription)
                .header("message-id", self.next_message_id.to_string())
                .with_body(body),
        );
    }

    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}
