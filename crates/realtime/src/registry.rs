//! Topic subscription registry.
//!
//! Multiplexes many in-process callbacks onto at most one broker-level
//! subscription per topic. Callbacks register with
//! [`TopicRegistry::subscribe`] and keep the returned [`Subscription`]
//! guard; dropping the guard (or calling
//! [`Subscription::unsubscribe`]) removes the callback.
//!
//! A topic's broker subscription exists exactly while its callback set is
//! non-empty and a session is connected. When the last callback leaves,
//! the entry is deleted and the broker subscription is closed.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::link::{BrokerLink, BrokerSubscriptionId};
use crate::message::RealtimeMessage;

/// A realtime event handler. Invoked synchronously on the delivery path,
/// so it must not block.
pub type Callback = Arc<dyn Fn(&RealtimeMessage) + Send + Sync>;

struct TopicEntry {
    callbacks: BTreeMap<u64, Callback>,
    broker_subscription: Option<BrokerSubscriptionId>,
}

#[derive(Default)]
struct RegistryState {
    topics: HashMap<String, TopicEntry>,
    next_callback_id: u64,
}

/// Maps topic names to the callbacks interested in them.
pub struct TopicRegistry {
    state: Mutex<RegistryState>,
    link: Arc<dyn BrokerLink>,
}

impl TopicRegistry {
    pub fn new(link: Arc<dyn BrokerLink>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState::default()),
            link,
        })
    }

    /// Register `callback` for `topic`.
    ///
    /// The first callback on a topic opens the broker subscription if a
    /// session is connected; otherwise the next connect does it. The
    /// callback is registered in either case.
    pub fn subscribe<F>(self: &Arc<Self>, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut state = self.lock();
        let id = state.next_callback_id;
        state.next_callback_id += 1;

        let entry = state
            .topics
            .entry(topic.clone())
            .or_insert_with(|| TopicEntry {
                callbacks: BTreeMap::new(),
                broker_subscription: None,
            });
        if entry.callbacks.is_empty() && entry.broker_subscription.is_none() {
            entry.broker_subscription = self.link.subscribe(&topic);
        }
        entry.callbacks.insert(id, Arc::new(callback));

        tracing::debug!(
            topic = %topic,
            callbacks = entry.callbacks.len(),
            broker_subscribed = entry.broker_subscription.is_some(),
            "Realtime callback registered",
        );

        Subscription {
            registry: Arc::downgrade(self),
            topic,
            id,
            active: true,
        }
    }

    /// Fan a MESSAGE frame body out to the topic's current callbacks.
    ///
    /// `subscription` is the frame's `subscription` header; a value that
    /// does not match the topic's live broker subscription marks the frame
    /// as stale and it is dropped. Undecodable bodies are logged and
    /// dropped. Returns the number of callbacks invoked.
    pub fn deliver(&self, topic: &str, subscription: Option<&str>, body: &str) -> usize {
        let callbacks: Vec<Callback> = {
            let state = self.lock();
            let Some(entry) = state.topics.get(topic) else {
                tracing::trace!(topic, "Message for topic without callbacks");
                return 0;
            };
            if let Some(sub) = subscription {
                if entry.broker_subscription.as_ref().map(|s| s.as_str()) != Some(sub) {
                    tracing::trace!(topic, subscription = sub, "Dropping message from stale subscription");
                    return 0;
                }
            }
            entry.callbacks.values().cloned().collect()
        };

        let message = match RealtimeMessage::decode(body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    topic,
                    error = %e,
                    raw_message = %body,
                    "Failed to decode realtime message",
                );
                return 0;
            }
        };

        for callback in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(&message))).is_err() {
                tracing::error!(topic, kind = %message.kind, "Realtime callback panicked");
            }
        }
        callbacks.len()
    }

    /// Open broker subscriptions for every topic that lacks one.
    ///
    /// Called by the connection manager right after CONNECTED, before any
    /// MESSAGE frame of the new session is processed. Returns the number
    /// of subscriptions issued.
    pub fn resubscribe_all(&self) -> usize {
        let mut state = self.lock();
        let mut issued = 0;
        for (topic, entry) in state.topics.iter_mut() {
            if entry.callbacks.is_empty() || entry.broker_subscription.is_some() {
                continue;
            }
            entry.broker_subscription = self.link.subscribe(topic);
            if entry.broker_subscription.is_some() {
                issued += 1;
            }
        }
        issued
    }

    /// Forget all broker subscription ids after the session dropped.
    pub fn reset_broker_subscriptions(&self) {
        let mut state = self.lock();
        for entry in state.topics.values_mut() {
            entry.broker_subscription = None;
        }
    }

    /// Topics that currently have at least one callback.
    pub fn active_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.lock().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn callback_count(&self, topic: &str) -> usize {
        self.lock()
            .topics
            .get(topic)
            .map_or(0, |entry| entry.callbacks.len())
    }

    /// The live broker subscription for `topic`, if any.
    pub fn broker_subscription(&self, topic: &str) -> Option<BrokerSubscriptionId> {
        self.lock()
            .topics
            .get(topic)
            .and_then(|entry| entry.broker_subscription.clone())
    }

    fn remove(&self, topic: &str, id: u64) {
        let mut state = self.lock();
        let Some(entry) = state.topics.get_mut(topic) else {
            return;
        };
        entry.callbacks.remove(&id);
        if !entry.callbacks.is_empty() {
            return;
        }
        if let Some(entry) = state.topics.remove(topic) {
            if let Some(sub) = entry.broker_subscription {
                self.link.unsubscribe(&sub);
            }
            tracing::debug!(topic, "Last realtime callback removed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Disposer for one registered callback.
///
/// Unsubscribes on drop. Removal is synchronous: once
/// [`unsubscribe`](Self::unsubscribe) returns, later deliveries no longer
/// see the callback.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<TopicRegistry>,
    topic: String,
    id: u64,
    active: bool,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remove the callback. Idempotent.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.topic, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// The consumer-facing realtime capability.
///
/// Cheap to clone. Exposes subscription only; the connection itself
/// stays with the connection manager.
#[derive(Clone)]
pub struct Realtime {
    registry: Arc<TopicRegistry>,
}

impl Realtime {
    pub fn new(registry: Arc<TopicRegistry>) -> Self {
        Self { registry }
    }

    pub fn subscribe<F>(&self, topic: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&RealtimeMessage) + Send + Sync + 'static,
    {
        self.registry.subscribe(topic, callback)
    }
}
