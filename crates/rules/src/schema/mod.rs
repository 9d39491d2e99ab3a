//! Rule schema types with serde deserialization.
//!
//! - `RuleDefinition`: what the rule store holds, with opaque condition/action maps
//! - `ConditionConfig` / `ActionConfig`: closed variant sets the validator compiles into
//! - `RuleExecutionContext`: per-request evaluation input
//! - `RuleEvaluationResult` / `RuleExecutionResult`: value-typed outcomes

mod action;
mod condition;
mod context;
mod definition;
mod policy;
mod result;
pub mod time_format;

pub use action::*;
pub use condition::*;
pub use context::*;
pub use definition::*;
pub use policy::*;
pub use result::*;
