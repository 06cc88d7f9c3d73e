//! Transport client for the broker endpoint.
//!
//! [`BrokerClient`] holds the resolved endpoint for one backend. Call
//! [`BrokerClient::connect`] to open the WebSocket and send the STOMP
//! CONNECT frame; the returned [`BrokerConnection`] is then driven by the
//! session loop until it drops.

use futures::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use crate::config::{host_of, ConfigError, RealtimeConfig};
use crate::frame::Frame;
use crate::heartbeat::HeartBeat;

pub type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection settings for the broker endpoint.
pub struct BrokerClient {
    url: String,
    host: String,
    heart_beat: HeartBeat,
}

/// A WebSocket to the broker on which CONNECT has been sent.
///
/// The CONNECTED reply has not been read yet; the session loop waits for
/// it before treating the connection as live.
pub struct BrokerConnection {
    pub url: String,
    /// Heart-beat offer sent in CONNECT.
    pub heart_beat: HeartBeat,
    pub ws_stream: WsStream,
}

impl BrokerClient {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let host = host_of(&url).unwrap_or_default();
        Self {
            url,
            host,
            heart_beat: HeartBeat::client_default(),
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.transport_url()?))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the WebSocket and send CONNECT.
    pub async fn connect(&self) -> Result<BrokerConnection, ClientError> {
        let (mut ws_stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            ClientError::Connection(format!("Failed to connect to broker at {}: {e}", self.url))
        })?;

        let connect = Frame::connect(&self.host, self.heart_beat).encode();
        ws_stream
            .send(Message::Text(connect))
            .await
            .map_err(|e| ClientError::Protocol(format!("Failed to send CONNECT: {e}")))?;

        tracing::debug!(url = %self.url, "Broker transport open, CONNECT sent");

        Ok(BrokerConnection {
            url: self.url.clone(),
            heart_beat: self.heart_beat,
            ws_stream,
        })
    }
}

/// Errors that can occur when opening the broker transport.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to establish the WebSocket.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The socket opened but the STOMP handshake could not be sent.
    #[error("Protocol error: {0}")]
    Protocol(String),
}
