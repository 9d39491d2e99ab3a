//! Closed set of action types a rule can trigger.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::condition::union_all;
use super::result::AttendanceStatus;

/// Action half of a rule, decoded from the rule's opaque `action` map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionConfig {
    /// Compute status, work hours and overtime into the result data.
    Classify,
    /// Render `message` and send it to the notification collaborator.
    Alert {
        #[serde(default)]
        level: AlertLevel,
        message: String,
        /// Dispatcher channel; unset routes to the default channels.
        #[serde(default)]
        channel: Option<String>,
    },
    /// Addressed notification with a templated subject and body.
    Notify {
        recipients: Vec<String>,
        subject: String,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        channel: Option<String>,
    },
    /// Propose a corrected status for the record.
    Correction {
        status: AttendanceStatus,
        #[serde(default)]
        reason: Option<String>,
    },
    Log {
        message: String,
        #[serde(default)]
        level: AlertLevel,
    },
    /// Raise one alert per device whose reported status is not normal.
    DeviceStatusCheck {
        #[serde(default = "default_status_attribute")]
        attribute: String,
        #[serde(default = "default_normal_statuses")]
        normal_statuses: Vec<String>,
        #[serde(default)]
        level: AlertLevel,
        /// Alert text template; `device.id` and `device.status` are in scope.
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        channel: Option<String>,
    },
    /// Run several actions in order; one failing does not stop the rest.
    Sequence {
        actions: Vec<ActionConfig>,
    },
    /// Dispatch to a handler registered under `handler`.
    Custom {
        handler: String,
        #[serde(default)]
        params: Value,
    },
}

fn default_status_attribute() -> String {
    "device_statuses".to_string()
}

fn default_normal_statuses() -> Vec<String> {
    vec!["ONLINE".to_string()]
}

/// Built-in action type tags.
pub const ACTION_TYPES: &[&str] = &[
    "classify",
    "alert",
    "notify",
    "correction",
    "log",
    "device_status_check",
    "sequence",
    "custom",
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    #[default]
    Warning,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

fn fields(names: &[&str]) -> Option<BTreeSet<String>> {
    Some(names.iter().map(|n| n.to_string()).collect())
}

impl ActionConfig {
    /// Type under which statistics and handler lookup are keyed. Custom
    /// actions report their handler name.
    pub fn action_type(&self) -> &str {
        match self {
            Self::Classify => "classify",
            Self::Alert { .. } => "alert",
            Self::Notify { .. } => "notify",
            Self::Correction { .. } => "correction",
            Self::Log { .. } => "log",
            Self::DeviceStatusCheck { .. } => "device_status_check",
            Self::Sequence { .. } => "sequence",
            Self::Custom { handler, .. } => handler,
        }
    }

    /// Context fields the action's output depends on. Templated actions
    /// can reference anything, so they report `None` (whole context).
    pub fn declared_inputs(&self) -> Option<BTreeSet<String>> {
        match self {
            Self::Classify | Self::Correction { .. } => fields(&["punch_in", "punch_out"]),
            Self::DeviceStatusCheck { attribute, message: None, .. } => Some(BTreeSet::from([attribute.clone()])),
            Self::DeviceStatusCheck { message: Some(_), .. } => None,
            Self::Sequence { actions } => union_all(actions.iter().map(ActionConfig::declared_inputs)),
            Self::Alert { .. } | Self::Notify { .. } | Self::Log { .. } | Self::Custom { .. } => None,
        }
    }

    pub fn needs_policy(&self) -> bool {
        match self {
            Self::Classify | Self::Correction { .. } => true,
            Self::Sequence { actions } => actions.iter().any(ActionConfig::needs_policy),
            _ => false,
        }
    }
}
