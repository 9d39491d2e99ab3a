//! Notifier trait definition and shared error types.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::schema::AlertLevel;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub level: AlertLevel,
    /// Addressees for `notify` actions; empty for broadcast alerts.
    pub recipients: Vec<String>,
    /// Additional metadata (rule id, user id, device id, ...).
    pub metadata: HashMap<String, String>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, level: AlertLevel) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            level,
            recipients: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "log", "sms").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub channel: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

// ── Built-in channels ───────────────────────────────────────────────

/// Writes notifications to the tracing log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let rule_id = notification.metadata.get("rule_id").map(String::as_str).unwrap_or("");
        match notification.level {
            AlertLevel::Info => {
                tracing::info!(rule_id, subject = %notification.subject, body = %notification.body, "attendance notification")
            }
            AlertLevel::Warning | AlertLevel::Critical => {
                tracing::warn!(
                    rule_id,
                    level = %notification.level,
                    subject = %notification.subject,
                    body = %notification.body,
                    "attendance alert"
                )
            }
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

/// Keeps every notification it receives; can be switched to fail.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: std::sync::atomic::AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording channel set to fail".to_string()));
        }
        self.sent.lock().expect("notifier lock poisoned").push(notification.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}
