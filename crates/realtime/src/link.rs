//! The outbound side of the broker connection as seen by the registry.
//!
//! [`BrokerLink`] is the seam between the topic registry and the live
//! session: the registry asks it to open or close broker-level
//! subscriptions and never touches the socket itself. [`StompLink`] is
//! the production implementation; it is attached to a session's outbound
//! frame queue once the broker has answered CONNECTED and detached when
//! the session ends.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::frame::Frame;

/// The `id` header of a broker-level SUBSCRIBE.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerSubscriptionId(String);

impl BrokerSubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BrokerSubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Broker operations the topic registry depends on.
///
/// Implementations must not block and must not call back into the
/// registry; they are invoked while the registry lock is held.
pub trait BrokerLink: Send + Sync {
    /// Open a broker subscription for `topic`.
    ///
    /// Returns `None` when there is no connected session; the registry
    /// then waits for the next connect to subscribe.
    fn subscribe(&self, topic: &str) -> Option<BrokerSubscriptionId>;

    /// Close a broker subscription. A no-op without a connected session.
    fn unsubscribe(&self, id: &BrokerSubscriptionId);
}

/// [`BrokerLink`] that writes SUBSCRIBE/UNSUBSCRIBE frames to the
/// current session's outbound queue.
#[derive(Default)]
pub struct StompLink {
    outbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    next_id: AtomicU64,
}

impl StompLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route frames to a newly connected session.
    pub fn attach(&self, tx: mpsc::UnboundedSender<Frame>) {
        *self.lock() = Some(tx);
    }

    /// Forget the session. Subsequent subscribes report "not connected".
    pub fn detach(&self) {
        *self.lock() = None;
    }

    /// Whether a connected session is currently attached.
    pub fn is_attached(&self) -> bool {
        self.lock().as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn send(&self, frame: Frame) -> bool {
        match self.lock().as_ref() {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<Frame>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BrokerLink for StompLink {
    fn subscribe(&self, topic: &str) -> Option<BrokerSubscriptionId> {
        let id = BrokerSubscriptionId(format!(
            "sub-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));
        if self.send(Frame::subscribe(id.as_str(), topic)) {
            tracing::debug!(topic, subscription = %id, "Broker subscription opened");
            Some(id)
        } else {
            None
        }
    }

    fn unsubscribe(&self, id: &BrokerSubscriptionId) {
        if self.send(Frame::unsubscribe(id.as_str())) {
            tracing::debug!(subscription = %id, "Broker subscription closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Command;

    #[test]
    fn detached_link_refuses_subscriptions() {
        let link = StompLink::new();
        assert!(!link.is_attached());
        assert!(link.subscribe("/topic/queue").is_none());
    }

    #[test]
    fn attached_link_emits_subscribe_frames_with_unique_ids() {
        let link = StompLink::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        link.attach(tx);

        let first = link.subscribe("/topic/queue").unwrap();
        let second = link.subscribe("/topic/queue/b1").unwrap();
        assert_ne!(first, second);

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.command, Command::Subscribe);
        assert_eq!(frame.get("id"), Some(first.as_str()));
        assert_eq!(frame.get("destination"), Some("/topic/queue"));

        link.unsubscribe(&second);
        let _ = rx.try_recv().unwrap();
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.command, Command::Unsubscribe);
        assert_eq!(frame.get("id"), Some(second.as_str()));
    }

    #[test]
    fn closed_session_counts_as_detached() {
        let link = StompLink::new();
        let (tx, rx) = mpsc::unbounded_channel();
        link.attach(tx);
        drop(rx);
        assert!(!link.is_attached());
        assert!(link.subscribe("/topic/queue").is_none());
    }
}
