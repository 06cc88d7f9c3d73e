//! User-visible notifications (toasts).

/// Text shown when a notification-like event carries no body.
pub const DEFAULT_NOTIFICATION_TEXT: &str = "Thông báo mới";

/// Shows a short informational message to the user.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
}

/// Notifier for headless use: every toast becomes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        tracing::info!(text = message, "Notification");
    }
}
