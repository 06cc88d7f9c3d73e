//! Fixed-interval refresh for views that are not wired to the broker.
//!
//! A [`PollingQuery`] invalidates one query key every period until it is
//! stopped or dropped. Freshness is bounded by the period only; there is
//! no push and no ordering between polled keys.

use std::sync::Arc;
use std::time::Duration;

use patientflow_core::types::{BranchId, EntityId, PatientId};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::cache::{
    QueryCache, QueryKey, ANALYTICS, DOCTOR_CHAT_CONVERSATIONS, DOCTOR_CHAT_HISTORY,
    PORTAL_CHAT_HISTORY,
};

/// Doctor chat conversation list.
pub const DOCTOR_CONVERSATIONS_PERIOD: Duration = Duration::from_secs(10);

/// Doctor chat messages with one patient.
pub const DOCTOR_CHAT_HISTORY_PERIOD: Duration = Duration::from_secs(3);

/// Patient chat messages with one doctor.
pub const PORTAL_CHAT_HISTORY_PERIOD: Duration = Duration::from_secs(3);

/// Branch analytics for today.
pub const ANALYTICS_PERIOD: Duration = Duration::from_secs(30);

/// A running poll loop for one key.
pub struct PollingQuery {
    key: QueryKey,
    period: Duration,
    cancel: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl PollingQuery {
    /// Spawn the loop. The first invalidation happens one `period` after
    /// start. Must be called from within a tokio runtime.
    pub fn start(cache: Arc<dyn QueryCache>, key: QueryKey, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        tracing::trace!(key = %task_key, "Polling refresh");
                        cache.invalidate(&task_key);
                    }
                }
            }
            tracing::debug!(key = %task_key, "Polling stopped");
        });

        tracing::debug!(%key, period_ms = period.as_millis() as u64, "Polling started");
        Self {
            key,
            period,
            cancel,
            handle: Some(handle),
        }
    }

    pub fn doctor_conversations(cache: Arc<dyn QueryCache>) -> Self {
        Self::start(
            cache,
            QueryKey::new(DOCTOR_CHAT_CONVERSATIONS),
            DOCTOR_CONVERSATIONS_PERIOD,
        )
    }

    pub fn doctor_chat_history(cache: Arc<dyn QueryCache>, patient: PatientId) -> Self {
        Self::start(
            cache,
            QueryKey::new(DOCTOR_CHAT_HISTORY).with(patient),
            DOCTOR_CHAT_HISTORY_PERIOD,
        )
    }

    pub fn portal_chat_history(cache: Arc<dyn QueryCache>, doctor: EntityId) -> Self {
        Self::start(
            cache,
            QueryKey::new(PORTAL_CHAT_HISTORY).with(doctor),
            PORTAL_CHAT_HISTORY_PERIOD,
        )
    }

    pub fn analytics_today(cache: Arc<dyn QueryCache>, branch: BranchId) -> Self {
        Self::start(
            cache,
            QueryKey::new(ANALYTICS).with("today").with(branch),
            ANALYTICS_PERIOD,
        )
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PollingQuery {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
