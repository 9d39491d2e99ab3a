//! Cache keys derived from a rule id and the context fields it reads.

use std::collections::BTreeSet;

use attend_core::RuleId;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::schema::RuleExecutionContext;

/// SHA-256 over the rule id and the selected context fields.
///
/// With `inputs = None` the whole serialized context is hashed. Missing
/// fields hash as `null`, so "absent" and "explicitly null" collide, which
/// matches how conditions treat them.
pub fn fingerprint(rule_id: RuleId, inputs: Option<&BTreeSet<String>>, ctx: &RuleExecutionContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(rule_id.to_le_bytes());
    match inputs {
        Some(fields) => {
            for name in fields {
                let value = ctx.field(name).unwrap_or(Value::Null);
                hasher.update(name.as_bytes());
                hasher.update(b"=");
                hasher.update(value.to_string().as_bytes());
                hasher.update(b"\n");
            }
        }
        None => {
            let whole = serde_json::to_string(ctx).unwrap_or_default();
            hasher.update(b"*=");
            hasher.update(whole.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Storage key: `attend:rule:{id}:{fingerprint}`.
pub fn cache_key(rule_id: RuleId, inputs: Option<&BTreeSet<String>>, ctx: &RuleExecutionContext) -> String {
    format!("attend:rule:{rule_id}:{}", fingerprint(rule_id, inputs, ctx))
}
