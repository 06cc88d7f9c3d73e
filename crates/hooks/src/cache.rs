//! Query cache seam.
//!
//! Hooks never refetch anything themselves. They mark cached server data
//! stale through [`QueryCache::invalidate`]; whatever owns the data
//! refetches it. [`InvalidationBus`] is the in-process implementation: it
//! fans invalidated keys out to any number of refetchers over a
//! `tokio::sync::broadcast` channel.

use std::fmt;

use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Well-known keys
// ---------------------------------------------------------------------------

pub const PATIENT_NOTIFICATIONS: &str = "patient-notifications";
pub const PORTAL_DASHBOARD: &str = "portal-dashboard";
pub const PORTAL_APPOINTMENTS: &str = "portal-appointments";
pub const PORTAL_QUEUES: &str = "portal-queues";
pub const QUEUE_ENTRIES: &str = "queue-entries";
pub const DOCTOR_CHAT_CONVERSATIONS: &str = "doctor-chat-conversations";
pub const DOCTOR_CHAT_HISTORY: &str = "doctor-chat-history";
pub const PORTAL_CHAT_HISTORY: &str = "portal-chat-history";
pub const ANALYTICS: &str = "analytics";

// ---------------------------------------------------------------------------
// QueryKey
// ---------------------------------------------------------------------------

/// Semantic key of a cached query, e.g. `["doctor-chat-history", "<id>"]`.
///
/// Invalidating a key also invalidates every key it is a prefix of, so
/// `["queue-entries"]` covers `["queue-entries", "<queue>", "<branch>"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(root: impl Into<String>) -> Self {
        Self(vec![root.into()])
    }

    /// Append a segment.
    pub fn with(mut self, segment: impl fmt::Display) -> Self {
        self.0.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn root(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// Whether invalidating `self` invalidates `other`.
    pub fn matches(&self, other: &QueryKey) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<&str> for QueryKey {
    fn from(root: &str) -> Self {
        Self::new(root)
    }
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// Anything that can mark cached queries stale.
pub trait QueryCache: Send + Sync {
    fn invalidate(&self, key: &QueryKey);
}

/// Default buffer capacity for the invalidation channel.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast fan-out of invalidated query keys.
///
/// Publishing with no subscribers is not an error; the key is dropped.
/// Slow subscribers observe `RecvError::Lagged` and should treat it as
/// "refetch everything".
pub struct InvalidationBus {
    sender: broadcast::Sender<QueryKey>,
}

impl InvalidationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.sender.subscribe()
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl QueryCache for InvalidationBus {
    fn invalidate(&self, key: &QueryKey) {
        tracing::debug!(%key, "Invalidating query");
        let _ = self.sender.send(key.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_key_matches_scoped_keys() {
        let broad = QueryKey::new(QUEUE_ENTRIES);
        let scoped = QueryKey::new(QUEUE_ENTRIES).with("q1").with("b1");
        assert!(broad.matches(&scoped));
        assert!(broad.matches(&broad));
        assert!(!scoped.matches(&broad));
        assert!(!broad.matches(&QueryKey::new(PORTAL_QUEUES)));
    }

    #[test]
    fn display_lists_segments() {
        let key = QueryKey::new(DOCTOR_CHAT_HISTORY).with(42);
        assert_eq!(key.to_string(), "[doctor-chat-history, 42]");
        assert_eq!(key.root(), DOCTOR_CHAT_HISTORY);
    }

    #[test]
    fn serializes_as_array() {
        let key = QueryKey::new(PORTAL_CHAT_HISTORY).with("d1");
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            r#"["portal-chat-history","d1"]"#
        );
    }

    #[tokio::test]
    async fn bus_delivers_to_every_subscriber() {
        let bus = InvalidationBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.invalidate(&QueryKey::new(PORTAL_DASHBOARD));

        assert_eq!(rx1.recv().await.unwrap(), QueryKey::new(PORTAL_DASHBOARD));
        assert_eq!(rx2.recv().await.unwrap(), QueryKey::new(PORTAL_DASHBOARD));
    }

    #[test]
    fn invalidate_without_subscribers_does_not_panic() {
        InvalidationBus::default().invalidate(&QueryKey::new(PORTAL_QUEUES));
    }
}
