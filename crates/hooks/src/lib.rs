//! Realtime hooks for the patient-flow client.
//!
//! Each hook ties a feature's lifetime to one or more broker topics and
//! turns inbound events into query cache invalidations and notifications.
//! Views that are not wired to the broker use [`polling::PollingQuery`]
//! instead, which refreshes on a fixed period.

pub mod cache;
pub mod effect;
pub mod notify;
pub mod patient;
pub mod polling;
pub mod queue;

pub use cache::{InvalidationBus, QueryCache, QueryKey};
pub use notify::{Notifier, TracingNotifier};
pub use patient::{PatientKeys, PatientRealtime};
pub use polling::PollingQuery;
pub use queue::QueueBoardRealtime;

/// Lifecycle of a mounted hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    /// A required key is missing; nothing is subscribed.
    Inactive,
    /// Topic callbacks are registered.
    Subscribed,
}
