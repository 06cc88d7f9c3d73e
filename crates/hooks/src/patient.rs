//! Patient portal realtime hook.
//!
//! Listens on the patient's personal topic and, when a branch is known,
//! on that branch's queue topic. Events refresh the portal views through
//! the query cache; notification-like events also raise a toast.

use std::sync::Arc;

use patientflow_core::topics::{branch_queue_topic, patient_topic};
use patientflow_core::types::{BranchId, PatientId, TenantId};
use patientflow_realtime::{Realtime, RealtimeMessage, Subscription};

use crate::cache::{
    QueryCache, PATIENT_NOTIFICATIONS, PORTAL_APPOINTMENTS, PORTAL_DASHBOARD, PORTAL_QUEUES,
};
use crate::effect::Effect;
use crate::notify::Notifier;
use crate::HookState;

/// Keys the hook is scoped by. A change to any of them re-subscribes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientKeys {
    /// Selected tenant; without one the portal has no request context.
    pub tenant: Option<TenantId>,
    pub patient: Option<PatientId>,
    pub branch: Option<BranchId>,
}

impl PatientKeys {
    pub fn new(tenant: Option<TenantId>, patient: Option<PatientId>, branch: Option<BranchId>) -> Self {
        Self {
            tenant,
            patient,
            branch,
        }
    }
}

/// Effect table for `/topic/patient/{id}`.
pub fn personal_effect(kind: &str) -> Effect {
    match kind {
        "NOTIFICATION" | "QUEUE" | "BILLING" | "PHARMACY" => {
            Effect::toast_and_invalidate(&[PATIENT_NOTIFICATIONS, PORTAL_DASHBOARD])
        }
        "APPOINTMENT_REFRESH" => Effect::invalidate(&[PORTAL_APPOINTMENTS, PORTAL_DASHBOARD]),
        "QUEUE_REFRESH" => Effect::invalidate(&[PORTAL_QUEUES]),
        _ => Effect::IGNORE,
    }
}

/// Effect table for `/topic/queue/{branch}`.
pub fn branch_effect(kind: &str) -> Effect {
    match kind {
        "QUEUE_REFRESH" => Effect::invalidate(&[PORTAL_QUEUES]),
        _ => Effect::IGNORE,
    }
}

/// A mounted patient realtime hook.
///
/// Subscriptions are released by [`unmount`](Self::unmount), by a key
/// change in [`update`](Self::update), or when the hook is dropped.
pub struct PatientRealtime {
    realtime: Realtime,
    cache: Arc<dyn QueryCache>,
    notifier: Arc<dyn Notifier>,
    keys: PatientKeys,
    personal: Option<Subscription>,
    branch: Option<Subscription>,
}

impl PatientRealtime {
    pub fn mount(
        realtime: Realtime,
        cache: Arc<dyn QueryCache>,
        notifier: Arc<dyn Notifier>,
        keys: PatientKeys,
    ) -> Self {
        let mut hook = Self {
            realtime,
            cache,
            notifier,
            keys,
            personal: None,
            branch: None,
        };
        hook.subscribe();
        hook
    }

    pub fn state(&self) -> HookState {
        if self.personal.is_some() {
            HookState::Subscribed
        } else {
            HookState::Inactive
        }
    }

    pub fn keys(&self) -> &PatientKeys {
        &self.keys
    }

    /// Re-scope the hook. Old subscriptions are released before the new
    /// ones are made; identical keys are a no-op.
    pub fn update(&mut self, keys: PatientKeys) {
        if keys == self.keys {
            return;
        }
        self.release();
        self.keys = keys;
        self.subscribe();
    }

    pub fn unmount(&mut self) {
        self.release();
    }

    fn subscribe(&mut self) {
        let (Some(_), Some(patient)) = (self.keys.tenant, self.keys.patient) else {
            tracing::debug!(keys = ?self.keys, "Patient realtime inactive, missing tenant or patient");
            return;
        };

        self.personal = Some(self.realtime.subscribe(
            patient_topic(patient),
            handler(&self.cache, &self.notifier, "personal", personal_effect),
        ));

        if let Some(branch) = self.keys.branch {
            self.branch = Some(self.realtime.subscribe(
                branch_queue_topic(branch),
                handler(&self.cache, &self.notifier, "branch", branch_effect),
            ));
        }

        tracing::debug!(
            %patient,
            branch = ?self.keys.branch,
            "Patient realtime subscribed",
        );
    }

    fn release(&mut self) {
        if let Some(mut sub) = self.personal.take() {
            sub.unsubscribe();
        }
        if let Some(mut sub) = self.branch.take() {
            sub.unsubscribe();
        }
    }
}

fn handler(
    cache: &Arc<dyn QueryCache>,
    notifier: &Arc<dyn Notifier>,
    channel: &'static str,
    table: fn(&str) -> Effect,
) -> impl Fn(&RealtimeMessage) + Send + Sync + 'static {
    let cache = Arc::clone(cache);
    let notifier = Arc::clone(notifier);
    move |msg: &RealtimeMessage| {
        let effect = table(&msg.kind);
        if effect.is_ignored() {
            tracing::trace!(channel, kind = %msg.kind, "Ignoring realtime event");
            return;
        }
        tracing::debug!(channel, kind = %msg.kind, "Realtime event");
        effect.apply(msg, cache.as_ref(), notifier.as_ref());
    }
}
