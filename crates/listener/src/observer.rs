//! Background loops that log invalidations and connection changes.

use patientflow_hooks::QueryKey;
use patientflow_realtime::ConnectionEvent;
use tokio::sync::broadcast;

/// Log every invalidated query key until the bus is dropped.
///
/// Returns the number of keys observed.
pub async fn log_invalidations(mut receiver: broadcast::Receiver<QueryKey>) -> u64 {
    let mut seen = 0u64;
    loop {
        match receiver.recv().await {
            Ok(key) => {
                seen += 1;
                tracing::info!(%key, "Query invalidated");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Invalidation logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!("Invalidation bus closed, logger shutting down");
                break;
            }
        }
    }
    seen
}

/// Log connection lifecycle events until the manager is dropped.
pub async fn log_connection_events(mut receiver: broadcast::Receiver<ConnectionEvent>) {
    loop {
        match receiver.recv().await {
            Ok(ConnectionEvent::Connected {
                epoch,
                resubscribed,
                at,
            }) => {
                tracing::info!(epoch, resubscribed, connected_at = %at, "Realtime connected");
            }
            Ok(ConnectionEvent::Disconnected { epoch }) => {
                tracing::warn!(epoch, "Realtime disconnected");
            }
            Ok(ConnectionEvent::BrokerError { message }) => {
                tracing::error!(broker_message = %message, "Realtime broker error");
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Connection event logger lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
