//! Notification collaborator: channels, routing and message templates.

mod dispatcher;
mod templating;
mod traits;

pub use dispatcher::Dispatcher;
pub use templating::{DeviceContext, RuleContext, TemplateContext, TemplateError, TemplateRenderer};
pub use traits::{DispatchResult, LogNotifier, Notification, Notifier, NotifyError, RecordingNotifier};
