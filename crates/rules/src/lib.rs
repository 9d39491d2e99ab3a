//! Attendance rule evaluation and execution engine.
//!
//! This crate provides:
//! - Typed rule definitions with opaque condition/action maps compiled by
//!   the validator into closed condition and action variants
//! - Rule stores: a YAML directory loader with hot reload via `notify`,
//!   and an in-memory loader
//! - The attendance time calculus (grace periods, cross-midnight hours,
//!   overtime, geofence, device binding, working days)
//! - A two-tier result cache keyed by rule and the context fields it reads
//! - Pluggable condition evaluators and action executors
//! - [`RuleExecutionService`], which composes all of the above

pub mod alerting;
pub mod audit_log;
pub mod cache;
pub mod calculus;
pub mod evaluator;
pub mod executor;
pub mod loader;
pub mod schema;
pub mod service;
pub mod validation;

pub use executor::{ExecutionRequest, RuleExecutor};
pub use loader::{InMemoryRuleLoader, RuleLoader, YamlRuleLoader};
pub use schema::{RuleDefinition, RuleEvaluationResult, RuleExecutionContext};
pub use service::{RuleExecutionService, RuleExecutionServiceBuilder};
