//! Per-connection frame processing loop.
//!
//! Drives one [`BrokerConnection`] from the CONNECT handshake until the
//! socket closes, the broker goes silent past its deadline, or the
//! manager cancels. Until CONNECTED arrives the deadline comes from the
//! client's own heart-beat offer. Inbound MESSAGE frames are handed to the topic
//! registry in arrival order; outbound frames queued by the broker link
//! are written to the socket.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::BrokerConnection;
use crate::events::{ConnectionEvent, ConnectionState};
use crate::frame::{is_heartbeat, parse_frames, Command, Frame, HEARTBEAT_EOL};
use crate::heartbeat::{handshake_plan, negotiate, HeartBeat, HeartbeatPlan};
use crate::link::StompLink;
use crate::registry::TopicRegistry;

/// Shared state a session reports into.
pub(crate) struct SessionContext<'a> {
    pub registry: &'a TopicRegistry,
    pub link: &'a StompLink,
    pub state_tx: &'a watch::Sender<ConnectionState>,
    pub event_tx: &'a broadcast::Sender<ConnectionEvent>,
    pub epoch: u64,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// The manager asked the session to stop.
    Cancelled,
    /// The connection was lost; the caller should reconnect.
    Dropped,
}

/// Mutable per-session bookkeeping.
struct Session<'a> {
    ctx: &'a SessionContext<'a>,
    offer: HeartBeat,
    outbound: mpsc::UnboundedSender<Frame>,
    connected: bool,
    send_timer: Option<Interval>,
    watchdog: Option<(Interval, Duration)>,
}

/// Run a session to completion. The broker link is always detached on
/// return.
pub(crate) async fn run_session(
    conn: BrokerConnection,
    ctx: &SessionContext<'_>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = conn.ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let mut session = Session {
        ctx,
        offer: conn.heart_beat,
        outbound,
        connected: false,
        send_timer: None,
        watchdog: watchdog_for(&handshake_plan(conn.heart_beat)),
    };
    let mut last_received = Instant::now();

    let end = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if session.connected {
                    let _ = sink.send(Message::Text(Frame::disconnect().encode())).await;
                }
                let _ = sink.close().await;
                break SessionEnd::Cancelled;
            }
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            tracing::warn!(epoch = ctx.epoch, "Ignoring non-UTF-8 binary frame");
                            last_received = Instant::now();
                            continue;
                        }
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                        last_received = Instant::now();
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(epoch = ctx.epoch, ?frame, "Broker WebSocket closed");
                        break SessionEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(epoch = ctx.epoch, error = %e, "Broker WebSocket receive error");
                        break SessionEnd::Dropped;
                    }
                    None => break SessionEnd::Dropped,
                };
                last_received = Instant::now();
                session.handle_text(&text);
            }
            Some(frame) = outbound_rx.recv() => {
                if let Err(e) = sink.send(Message::Text(frame.encode())).await {
                    tracing::warn!(epoch = ctx.epoch, error = %e, "Failed to send frame to broker");
                    break SessionEnd::Dropped;
                }
            }
            _ = tick(&mut session.send_timer) => {
                if let Err(e) = sink.send(Message::Text(HEARTBEAT_EOL.to_string())).await {
                    tracing::warn!(epoch = ctx.epoch, error = %e, "Failed to send heart-beat");
                    break SessionEnd::Dropped;
                }
            }
            deadline = watch_tick(&mut session.watchdog) => {
                if last_received.elapsed() > deadline {
                    let silent_ms = last_received.elapsed().as_millis() as u64;
                    if session.connected {
                        tracing::warn!(epoch = ctx.epoch, silent_ms, "Broker heart-beat missed, dropping connection");
                    } else {
                        tracing::warn!(epoch = ctx.epoch, silent_ms, "No CONNECTED from broker, dropping connection");
                    }
                    break SessionEnd::Dropped;
                }
            }
        }
    };

    ctx.link.detach();
    end
}

impl Session<'_> {
    fn handle_text(&mut self, text: &str) {
        if is_heartbeat(text) {
            tracing::trace!(epoch = self.ctx.epoch, "Broker heart-beat");
            return;
        }
        for parsed in parse_frames(text) {
            match parsed {
                Ok(frame) => self.handle_frame(frame),
                Err(e) => {
                    tracing::warn!(
                        epoch = self.ctx.epoch,
                        error = %e,
                        raw_frame = %text,
                        "Failed to parse broker frame",
                    );
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame.command {
            Command::Connected => self.on_connected(&frame),
            Command::Message => self.on_message(&frame),
            Command::Receipt => {
                tracing::debug!(
                    epoch = self.ctx.epoch,
                    receipt = frame.get("receipt-id").unwrap_or_default(),
                    "Broker receipt",
                );
            }
            Command::Error => {
                let message = frame.get("message").unwrap_or("unknown").to_string();
                tracing::error!(
                    epoch = self.ctx.epoch,
                    details = %frame.body,
                    "Broker reported error: {message}",
                );
                let _ = self
                    .ctx
                    .event_tx
                    .send(ConnectionEvent::BrokerError { message });
            }
            // Rejected by `parse_frames`.
            Command::Connect | Command::Subscribe | Command::Unsubscribe | Command::Disconnect => {}
        }
    }

    fn on_connected(&mut self, frame: &Frame) {
        if self.connected {
            tracing::warn!(epoch = self.ctx.epoch, "Duplicate CONNECTED frame ignored");
            return;
        }
        self.connected = true;

        let server = frame
            .get("heart-beat")
            .and_then(HeartBeat::parse)
            .unwrap_or(HeartBeat::DISABLED);
        let plan = negotiate(self.offer, server);
        self.send_timer = plan.send_every.map(periodic);
        self.watchdog = watchdog_for(&plan);

        self.ctx.link.attach(self.outbound.clone());
        self.ctx.state_tx.send_replace(ConnectionState::Connected);
        let resubscribed = self.ctx.registry.resubscribe_all();

        tracing::info!(
            epoch = self.ctx.epoch,
            version = frame.get("version").unwrap_or("1.0"),
            resubscribed,
            send_heartbeat_ms = plan.send_every.map(|d| d.as_millis() as u64),
            expect_heartbeat_ms = plan.expect_every.map(|d| d.as_millis() as u64),
            "Broker session connected",
        );
        let _ = self.ctx.event_tx.send(ConnectionEvent::Connected {
            epoch: self.ctx.epoch,
            resubscribed,
            at: chrono::Utc::now(),
        });
    }

    fn on_message(&mut self, frame: &Frame) {
        if !self.connected {
            tracing::warn!(epoch = self.ctx.epoch, "MESSAGE before CONNECTED ignored");
            return;
        }
        let Some(destination) = frame.get("destination") else {
            tracing::warn!(epoch = self.ctx.epoch, "MESSAGE without destination ignored");
            return;
        };
        let delivered =
            self.ctx
                .registry
                .deliver(destination, frame.get("subscription"), &frame.body);
        tracing::trace!(epoch = self.ctx.epoch, destination, delivered, "Message dispatched");
    }
}

fn periodic(every: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn watchdog_for(plan: &HeartbeatPlan) -> Option<(Interval, Duration)> {
    plan.expect_every
        .zip(plan.receive_deadline())
        .map(|(every, deadline)| (periodic(every), deadline))
}

async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn watch_tick(watchdog: &mut Option<(Interval, Duration)>) -> Duration {
    match watchdog {
        Some((interval, deadline)) => {
            interval.tick().await;
            *deadline
        }
        None => std::future::pending().await,
    }
}
