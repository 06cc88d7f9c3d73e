//! Queue board realtime hook.
//!
//! Staff dashboards listen on the global queue channel and refresh their
//! queue entry lists when the backend signals a change.

use std::sync::Arc;

use patientflow_core::topics::QUEUE_TOPIC;
use patientflow_realtime::{Realtime, RealtimeMessage, Subscription};

use crate::cache::{QueryCache, QUEUE_ENTRIES};
use crate::effect::Effect;
use crate::notify::Notifier;
use crate::HookState;

/// Effect table for the queue board channel.
pub fn board_effect(kind: &str) -> Effect {
    match kind {
        "QUEUE_REFRESH" => Effect::invalidate(&[QUEUE_ENTRIES]),
        "PATIENT_CALLED" => Effect::toast_and_invalidate(&[QUEUE_ENTRIES]),
        _ => Effect::IGNORE,
    }
}

pub struct QueueBoardRealtime {
    topic: String,
    subscription: Option<Subscription>,
}

impl QueueBoardRealtime {
    /// Mount on [`QUEUE_TOPIC`].
    pub fn mount(realtime: Realtime, cache: Arc<dyn QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self::mount_on(realtime, QUEUE_TOPIC, cache, notifier)
    }

    /// Mount on a specific queue topic.
    pub fn mount_on(
        realtime: Realtime,
        topic: impl Into<String>,
        cache: Arc<dyn QueryCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let topic = topic.into();
        let subscription = realtime.subscribe(topic.clone(), move |msg: &RealtimeMessage| {
            let effect = board_effect(&msg.kind);
            if effect.is_ignored() {
                return;
            }
            tracing::debug!(kind = %msg.kind, "Queue board event");
            effect.apply(msg, cache.as_ref(), notifier.as_ref());
        });
        tracing::debug!(topic = %topic, "Queue board subscribed");

        Self {
            topic,
            subscription: Some(subscription),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn state(&self) -> HookState {
        match self.subscription {
            Some(_) => HookState::Subscribed,
            None => HookState::Inactive,
        }
    }

    pub fn unmount(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }
}
