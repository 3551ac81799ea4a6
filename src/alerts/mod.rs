pub mod notifier;
pub mod throttle;

pub use notifier::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use throttle::{AlertKind, AlertThrottle, Notification};
