//! Routes notifications to configured channels.
//!
//! Actions name a channel (or none, for the defaults); the dispatcher
//! delivers to every notifier registered under it. Individual channel
//! failures don't block other channels.

use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{DispatchResult, Notification, Notifier};

#[derive(Default)]
pub struct Dispatcher {
    /// Channel name → notifiers behind it.
    named: HashMap<String, Vec<Arc<dyn Notifier>>>,
    /// Used when an action names no channel, or one with nothing registered.
    default_channels: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Dispatcher whose every notification goes to `channels`.
    pub fn with_defaults(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { named: HashMap::new(), default_channels: channels }
    }

    pub fn add_default(&mut self, notifier: Arc<dyn Notifier>) {
        self.default_channels.push(notifier);
    }

    pub fn add_channel(&mut self, name: impl Into<String>, notifier: Arc<dyn Notifier>) {
        self.named.entry(name.into()).or_default().push(notifier);
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named.keys().cloned().collect();
        names.sort();
        names
    }

    /// Deliver to every notifier behind `channel`.
    ///
    /// Returns one result per notifier, empty when nothing is configured.
    pub async fn dispatch(&self, channel: Option<&str>, notification: &Notification) -> Vec<DispatchResult> {
        let notifiers = channel
            .and_then(|name| self.named.get(name))
            .unwrap_or(&self.default_channels);

        if notifiers.is_empty() {
            tracing::debug!(channel = channel.unwrap_or("default"), "No notification channels configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(notifiers.len());

        for notifier in notifiers {
            let start = std::time::Instant::now();
            let result = notifier.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::debug!(channel = notifier.channel_name(), duration_ms, "Notification delivered");
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        channel = notifier.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: notifier.channel_name().to_string(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::RecordingNotifier;
    use crate::schema::AlertLevel;

    fn notification() -> Notification {
        Notification::new("test", "test body", AlertLevel::Warning)
    }

    #[tokio::test]
    async fn dispatch_to_all_default_channels() {
        let a = Arc::new(RecordingNotifier::new());
        let b = Arc::new(RecordingNotifier::new());
        let dispatcher = Dispatcher::with_defaults(vec![a.clone() as Arc<dyn Notifier>, b.clone()]);

        let results = dispatcher.dispatch(None, &notification()).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(a.sent().len(), 1);
        assert_eq!(b.sent().len(), 1);
    }

    #[tokio::test]
    async fn named_channel_routes_past_defaults() {
        let default = Arc::new(RecordingNotifier::new());
        let sms = Arc::new(RecordingNotifier::new());
        let mut dispatcher = Dispatcher::with_defaults(vec![default.clone() as Arc<dyn Notifier>]);
        dispatcher.add_channel("sms", sms.clone());

        dispatcher.dispatch(Some("sms"), &notification()).await;
        assert_eq!(sms.sent().len(), 1);
        assert!(default.sent().is_empty());

        // Unknown channel names fall back to the defaults.
        dispatcher.dispatch(Some("pager"), &notification()).await;
        assert_eq!(default.sent().len(), 1);
        assert_eq!(dispatcher.channel_names(), vec!["sms".to_string()]);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let failing = Arc::new(RecordingNotifier::new());
        failing.set_failing(true);
        let ok = Arc::new(RecordingNotifier::new());
        let dispatcher = Dispatcher::with_defaults(vec![failing as Arc<dyn Notifier>, ok.clone()]);

        let results = dispatcher.dispatch(None, &notification()).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.is_some());
        assert!(results[1].success);
        assert_eq!(ok.sent().len(), 1);
    }

    #[tokio::test]
    async fn no_channels_returns_empty() {
        let dispatcher = Dispatcher::empty();
        assert!(dispatcher.dispatch(None, &notification()).await.is_empty());
    }
}
