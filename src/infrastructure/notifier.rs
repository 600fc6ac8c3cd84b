use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn threshold_reached(threshold: u32) -> Self {
        Self {
            title: "Detoxify: High Toxicity".to_string(),
            message: format!(
                "Warning: {threshold} toxic messages detected in this chat. Consider reporting if you feel unsafe."
            ),
        }
    }
}

/// Local, user-facing notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification);
}

/// Emits notifications as warnings on the `notify` target.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) {
        tracing::warn!(
            target: "notify",
            title = %notification.title,
            "{}",
            notification.message
        );
    }
}
