//! Handle to an action running on a spawned task.

use attend_core::RuleId;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::schema::{codes, RuleExecutionResult};

/// Resolves once with the result of [`super::RuleExecutor::execute_async`].
pub struct ExecutionHandle {
    rule_id: RuleId,
    action_type: String,
    receiver: oneshot::Receiver<RuleExecutionResult>,
    abort: AbortHandle,
}

impl ExecutionHandle {
    pub(super) fn new(
        rule_id: RuleId,
        action_type: String,
        receiver: oneshot::Receiver<RuleExecutionResult>,
        abort: AbortHandle,
    ) -> Self {
        Self { rule_id, action_type, receiver, abort }
    }

    pub fn rule_id(&self) -> RuleId {
        self.rule_id
    }

    /// Stop the task. A later [`wait`](Self::wait) yields a `CANCELLED` result
    /// unless the task had already finished.
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }

    pub async fn wait(self) -> RuleExecutionResult {
        match self.receiver.await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(rule_id = self.rule_id, action_type = %self.action_type, "async action cancelled");
                RuleExecutionResult::failure(self.rule_id, self.action_type, codes::CANCELLED, "execution cancelled")
            }
        }
    }
}
