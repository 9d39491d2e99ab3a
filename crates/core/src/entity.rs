/// Identifier of a rule definition in the rule store.
pub type RuleId = u64;

/// Identifier of an employee / punching user.
pub type UserId = u64;

/// Identifier of an organizational department.
pub type DepartmentId = u64;

/// Reserved rule id used for results that describe a pipeline-level failure
/// (e.g. the rule store could not list a category) rather than a single rule.
pub const PIPELINE_RULE_ID: RuleId = 0;
