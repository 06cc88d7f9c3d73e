//! Connection lifecycle events emitted by the connection manager.
//!
//! These are diagnostics for the embedding application (logging, status
//! indicators). Topic consumers never need them; re-subscription after a
//! reconnect happens without their involvement.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Current state of the shared broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A change in the shared connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectionEvent {
    /// CONNECTED received and all registered topics re-subscribed.
    Connected {
        /// Increments on every successful (re)connection.
        epoch: u64,
        /// Number of broker subscriptions issued on connect.
        resubscribed: usize,
        at: DateTime<Utc>,
    },

    /// The session ended (socket closed, heart-beat timeout or shutdown).
    Disconnected { epoch: u64 },

    /// The broker sent an ERROR frame.
    BrokerError { message: String },
}
