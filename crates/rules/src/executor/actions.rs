//! Built-in action types.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ActionError, ActionOutput, ExecutionRequest, RuleExecutor};
use crate::alerting::{Notification, RuleContext, TemplateContext};
use crate::schema::{ActionConfig, AlertLevel, AttendancePolicy, AttendanceStatus, ExecutedAction};

impl RuleExecutor {
    /// Boxed so `sequence` can recurse into it.
    pub(super) fn run_action<'a>(
        &'a self,
        action: &'a ActionConfig,
        request: &'a ExecutionRequest,
    ) -> BoxFuture<'a, Result<ActionOutput, ActionError>> {
        self.dispatch(action, request).boxed()
    }

    async fn dispatch(&self, action: &ActionConfig, request: &ExecutionRequest) -> Result<ActionOutput, ActionError> {
        match action {
            ActionConfig::Classify => self.classify(request),
            ActionConfig::Alert { level, message, channel } => {
                let body = self.render(message, request)?;
                let notification = self.notification(request, format!("[{level}] {}", request.rule_name), body, *level);
                let delivered = self.deliver("alert", channel.as_deref(), &notification).await;
                Ok(output_for(delivered, "alert"))
            }
            ActionConfig::Notify { recipients, subject, body, channel } => {
                let subject = self.render(subject, request)?;
                let body = match body {
                    Some(body) => self.render(body, request)?,
                    None => subject.clone(),
                };
                let mut notification = self.notification(request, subject, body, AlertLevel::Info);
                notification.recipients = recipients.clone();
                let delivered = self.deliver("notify", channel.as_deref(), &notification).await;
                Ok(output_for(delivered, "notify").with_data("recipients", recipients.len()))
            }
            ActionConfig::Correction { status, reason } => self.correction(*status, reason.as_deref(), request),
            ActionConfig::Log { message, level } => {
                let rendered = self.render(message, request)?;
                match level {
                    AlertLevel::Info => info!(rule_id = request.rule_id, message = %rendered, "rule log action"),
                    AlertLevel::Warning | AlertLevel::Critical => {
                        warn!(rule_id = request.rule_id, level = %level, message = %rendered, "rule log action")
                    }
                }
                Ok(ActionOutput::ok("logged")
                    .with_data("message", rendered.clone())
                    .with_action(ExecutedAction::ok("log", rendered)))
            }
            ActionConfig::DeviceStatusCheck { attribute, normal_statuses, level, message, channel } => {
                self.device_status_check(request, attribute, normal_statuses, *level, message.as_deref(), channel.as_deref())
                    .await
            }
            ActionConfig::Sequence { actions } => self.sequence(actions, request).await,
            ActionConfig::Custom { handler, params } => {
                let Some(handler) = self.handler(handler) else {
                    return Err(ActionError::Unsupported(handler.clone()));
                };
                handler.execute(params, request).await
            }
        }
    }

    fn policy<'r>(&self, request: &'r ExecutionRequest, action: &str) -> Result<&'r AttendancePolicy, ActionError> {
        request.policy.as_ref().ok_or_else(|| ActionError::MissingPolicy(action.to_string()))
    }

    fn classify(&self, request: &ExecutionRequest) -> Result<ActionOutput, ActionError> {
        let policy = self.policy(request, "classify")?;
        let outcome = self.calculus.classify(&request.context.record(), policy);
        let detail = format!(
            "status {}, {:.2}h worked, {:.2}h overtime",
            outcome.status, outcome.work_hours, outcome.overtime_hours
        );
        Ok(ActionOutput::ok(format!("classified as {}", outcome.status))
            .with_data("status", outcome.status.to_string())
            .with_data("work_hours", outcome.work_hours)
            .with_data("overtime_hours", outcome.overtime_hours)
            .with_action(ExecutedAction::ok("classify", detail)))
    }

    fn correction(
        &self,
        status: AttendanceStatus,
        reason: Option<&str>,
        request: &ExecutionRequest,
    ) -> Result<ActionOutput, ActionError> {
        let policy = self.policy(request, "correction")?;
        let original = self.calculus.attendance_status(&request.context.record(), policy);
        let mut output = ActionOutput::ok(format!("correction proposed: {original} -> {status}"))
            .with_data("original_status", original.to_string())
            .with_data("corrected_status", status.to_string())
            .with_action(
                ExecutedAction::ok("correction", format!("{original} -> {status}"))
                    .with_target(request.context.user_id.to_string()),
            );
        if let Some(reason) = reason {
            output = output.with_data("reason", reason);
        }
        Ok(output)
    }

    async fn device_status_check(
        &self,
        request: &ExecutionRequest,
        attribute: &str,
        normal_statuses: &[String],
        level: AlertLevel,
        message: Option<&str>,
        channel: Option<&str>,
    ) -> Result<ActionOutput, ActionError> {
        let statuses = match request.context.attributes.get(attribute) {
            None | Some(Value::Null) => {
                return Ok(ActionOutput::ok("no device statuses reported").with_data("checked", 0));
            }
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ActionError::Failed(format!("attribute '{attribute}' is not a device status map")));
            }
        };

        let mut devices: Vec<(&String, String)> = statuses
            .iter()
            .map(|(id, status)| (id, status.as_str().map_or_else(|| status.to_string(), str::to_string)))
            .collect();
        devices.sort_by(|a, b| a.0.cmp(b.0));

        let base = self.template_context(request);
        let mut output = ActionOutput::ok("");
        let mut abnormal = Vec::new();

        for (device_id, status) in devices {
            if normal_statuses.iter().any(|n| n.eq_ignore_ascii_case(&status)) {
                continue;
            }
            let body = match message {
                Some(template) => self.renderer.render(template, &base.for_device(device_id, &status)).map_err(|e| {
                    ActionError::Notify(e.into())
                })?,
                None => format!("Device {device_id} reported status {status}"),
            };
            let notification = self
                .notification(request, format!("[{level}] Device {device_id} {status}"), body, level)
                .with_meta("device_id", device_id)
                .with_meta("device_status", &status);
            let delivered = self.deliver("alert", channel, &notification).await.with_target(device_id.clone());
            output.success &= delivered.success;
            output.actions.push(delivered);
            abnormal.push(Value::from(device_id.clone()));
        }

        output.message = format!("{} of {} devices abnormal", abnormal.len(), statuses.len());
        Ok(output.with_data("checked", statuses.len()).with_data("abnormal", abnormal))
    }

    async fn sequence(&self, actions: &[ActionConfig], request: &ExecutionRequest) -> Result<ActionOutput, ActionError> {
        let mut output = ActionOutput::ok("");
        let mut succeeded = 0;

        for action in actions {
            match self.run_action(action, request).await {
                Ok(step) => {
                    if step.success {
                        succeeded += 1;
                    }
                    output.success &= step.success;
                    output.data.extend(step.data);
                    output.actions.extend(step.actions);
                }
                Err(e) => {
                    debug!(rule_id = request.rule_id, action_type = action.action_type(), error = %e, "sequence step failed");
                    output.success = false;
                    output.actions.push(ExecutedAction::failed(action.action_type(), e.to_string()));
                }
            }
        }

        output.message = format!("{succeeded} of {} actions succeeded", actions.len());
        Ok(output)
    }

    // ── Rendering and delivery ──────────────────────────────────────

    fn template_context(&self, request: &ExecutionRequest) -> TemplateContext {
        let outcome = request.policy.as_ref().map(|p| self.calculus.classify(&request.context.record(), p));
        let rule = RuleContext {
            id: request.rule_id,
            name: request.rule_name.clone(),
            category: request.category.clone(),
        };
        TemplateContext::new(rule, &request.context, outcome)
    }

    fn render(&self, template: &str, request: &ExecutionRequest) -> Result<String, ActionError> {
        self.renderer
            .render(template, &self.template_context(request))
            .map_err(|e| ActionError::Notify(e.into()))
    }

    fn notification(&self, request: &ExecutionRequest, subject: String, body: String, level: AlertLevel) -> Notification {
        Notification::new(subject, body, level)
            .with_meta("rule_id", request.rule_id)
            .with_meta("user_id", request.context.user_id)
            .with_meta("attendance_date", request.context.attendance_date)
    }

    /// Dispatch and summarize the per-channel results. With no channel
    /// configured the attempt counts as delivered.
    async fn deliver(&self, action_type: &str, channel: Option<&str>, notification: &Notification) -> ExecutedAction {
        let results = self.dispatcher.dispatch(channel, notification).await;
        if results.is_empty() {
            return ExecutedAction::ok(action_type, "no notification channel configured");
        }

        let delivered: Vec<&str> = results.iter().filter(|r| r.success).map(|r| r.channel.as_str()).collect();
        if delivered.is_empty() {
            let errors: Vec<String> = results
                .iter()
                .map(|r| format!("{}: {}", r.channel, r.error.as_deref().unwrap_or("unknown error")))
                .collect();
            ExecutedAction::failed(action_type, errors.join("; "))
        } else {
            ExecutedAction::ok(action_type, format!("delivered via {}", delivered.join(", ")))
        }
    }
}

fn output_for(delivered: ExecutedAction, action_type: &str) -> ActionOutput {
    let output = if delivered.success {
        ActionOutput::ok(format!("{action_type} sent"))
    } else {
        ActionOutput::failed(format!("{action_type} delivery failed: {}", delivered.detail))
    };
    output.with_action(delivered)
}
