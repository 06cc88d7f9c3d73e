//! Side effects a realtime event maps to.
//!
//! Each hook owns a fixed table from event `type` to [`Effect`]. The
//! tables are the integration contract with the backend event schema;
//! types missing from a table map to [`Effect::IGNORE`].

use patientflow_realtime::RealtimeMessage;

use crate::cache::{QueryCache, QueryKey};
use crate::notify::{Notifier, DEFAULT_NOTIFICATION_TEXT};

/// What to do with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    /// Show the event body (or the default text) as a toast.
    pub toast: bool,
    /// Cache keys to invalidate, in order.
    pub invalidate: &'static [&'static str],
}

impl Effect {
    pub const IGNORE: Effect = Effect {
        toast: false,
        invalidate: &[],
    };

    pub const fn toast_and_invalidate(keys: &'static [&'static str]) -> Self {
        Self {
            toast: true,
            invalidate: keys,
        }
    }

    pub const fn invalidate(keys: &'static [&'static str]) -> Self {
        Self {
            toast: false,
            invalidate: keys,
        }
    }

    pub fn is_ignored(&self) -> bool {
        !self.toast && self.invalidate.is_empty()
    }

    /// Run the effect for `message`. The toast, if any, comes first.
    pub fn apply(&self, message: &RealtimeMessage, cache: &dyn QueryCache, notifier: &dyn Notifier) {
        if self.toast {
            let text = message
                .body
                .as_deref()
                .filter(|body| !body.is_empty())
                .unwrap_or(DEFAULT_NOTIFICATION_TEXT);
            notifier.info(text);
        }
        for key in self.invalidate {
            cache.invalidate(&QueryKey::new(*key));
        }
    }
}
