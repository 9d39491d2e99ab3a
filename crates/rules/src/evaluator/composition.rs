//! Boolean composition of evaluators.

use super::{EvaluationError, EvaluationScope, Evaluator};

#[derive(Debug, Clone, Copy)]
pub(super) enum LogicalOp {
    All,
    Any,
    Not,
}

/// Interior node of an evaluator tree. Children short-circuit in order;
/// an error from a child that is reached aborts the evaluation.
pub(super) struct Composite {
    pub(super) op: LogicalOp,
    pub(super) children: Vec<Box<dyn Evaluator>>,
}

impl Evaluator for Composite {
    fn evaluate(&self, scope: &EvaluationScope<'_>) -> Result<bool, EvaluationError> {
        match self.op {
            LogicalOp::All => {
                for child in &self.children {
                    if !child.evaluate(scope)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOp::Any => {
                for child in &self.children {
                    if child.evaluate(scope)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            // NOT applies to exactly one child.
            LogicalOp::Not => match self.children.first() {
                Some(child) => Ok(!child.evaluate(scope)?),
                None => Ok(true),
            },
        }
    }
}
