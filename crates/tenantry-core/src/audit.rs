//! Audit log records and diff helpers.
//!
//! Diffs are stored one level deep with secret-looking keys masked, so an
//! audit row never carries a credential that slipped into a request body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{AuditLogId, TenantId, UserId};

/// Keys whose values are always replaced by [`REDACTED`] (compared lowercase).
pub const SECRET_KEYS: &[&str] = &["password", "token", "secret", "authorization", "cookie", "csrf"];

/// Replacement for secret values.
pub const REDACTED: &str = "[REDACTED]";

/// Replacement for nested objects and arrays.
pub const NESTED: &str = "[object]";

/// One append-only audit entry. Tenant scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    /// Time-ordered id.
    pub id: AuditLogId,

    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Acting user, if any.
    pub user_id: Option<UserId>,

    /// Action name, e.g. `PRODUCT_UPDATE`.
    pub action: String,

    /// Affected entity type, e.g. `Product`.
    pub entity_type: Option<String>,

    /// Affected entity id.
    pub entity_id: Option<String>,

    /// Redacted before/after diff.
    pub diff: Option<Value>,

    /// Client IP.
    pub ip: Option<String>,

    /// Client user agent.
    pub user_agent: Option<String>,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Start an entry for `action`. The diff passed to [`AuditLog::with_diff`]
    /// is redacted on the way in.
    #[must_use]
    pub fn new(tenant_id: TenantId, user_id: Option<UserId>, action: impl Into<String>) -> Self {
        Self {
            id: AuditLogId::generate(),
            tenant_id,
            user_id,
            action: action.into(),
            entity_type: None,
            entity_id: None,
            diff: None,
            ip: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    /// Set the affected entity.
    #[must_use]
    pub fn entity(mut self, entity_type: &str, entity_id: impl ToString) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    /// Attach a diff, redacting it.
    #[must_use]
    pub fn with_diff(mut self, diff: &Value) -> Self {
        self.diff = Some(redact_diff(diff));
        self
    }

    /// Attach client metadata.
    #[must_use]
    pub fn client(mut self, ip: Option<String>, user_agent: Option<String>) -> Self {
        self.ip = ip;
        self.user_agent = user_agent;
        self
    }
}

/// Shallow redaction of one JSON value.
///
/// Objects keep their keys; secret keys are masked and nested objects or
/// arrays collapse to [`NESTED`]. Arrays keep primitives and collapse
/// nested containers. Primitives pass through.
#[must_use]
pub fn redact_once(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let masked = if is_secret(k) {
                        Value::String(REDACTED.to_string())
                    } else if v.is_object() || v.is_array() {
                        Value::String(NESTED.to_string())
                    } else {
                        v.clone()
                    };
                    (k.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| {
                    if v.is_object() || v.is_array() {
                        Value::String(NESTED.to_string())
                    } else {
                        v.clone()
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Redact a `{before, after}` diff: each side is redacted once. Anything
/// else is redacted as a plain value.
#[must_use]
pub fn redact_diff(diff: &Value) -> Value {
    let Value::Object(map) = diff else {
        return redact_once(diff);
    };
    if map.keys().all(|k| k == "before" || k == "after") {
        Value::Object(map.iter().map(|(k, v)| (k.clone(), redact_once(v))).collect())
    } else {
        redact_once(diff)
    }
}

fn is_secret(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SECRET_KEYS.contains(&lower.as_str())
}

/// Build a `{before, after}` diff restricted to `changed` keys.
#[must_use]
pub fn diff_for_update(before: &Map<String, Value>, after: &Map<String, Value>, changed: &[&str]) -> Value {
    let pick = |row: &Map<String, Value>| -> Map<String, Value> {
        changed
            .iter()
            .map(|k| ((*k).to_string(), row.get(*k).cloned().unwrap_or(Value::Null)))
            .collect()
    };
    serde_json::json!({ "before": pick(before), "after": pick(after) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secrets_are_masked_case_insensitively() {
        let out = redact_once(&json!({"Password": "hunter2", "csrf": "x", "name": "Widget"}));
        assert_eq!(out, json!({"Password": REDACTED, "csrf": REDACTED, "name": "Widget"}));
    }

    #[test]
    fn nested_values_collapse() {
        let out = redact_once(&json!({"meta": {"token": "t"}, "tags": [1, 2], "n": 1}));
        assert_eq!(out, json!({"meta": NESTED, "tags": NESTED, "n": 1}));

        let arr = redact_once(&json!([1, {"a": 1}, "x"]));
        assert_eq!(arr, json!([1, NESTED, "x"]));
    }

    #[test]
    fn primitives_pass_through() {
        assert_eq!(redact_once(&json!(5)), json!(5));
        assert_eq!(redact_once(&Value::Null), Value::Null);
    }

    #[test]
    fn diff_for_update_picks_changed_keys() {
        let before = json!({"name": "Old", "price_in_pence": 100, "sku": "A"});
        let after = json!({"name": "New", "price_in_pence": 100, "sku": "A"});
        let diff = diff_for_update(
            before.as_object().unwrap(),
            after.as_object().unwrap(),
            &["name"],
        );
        assert_eq!(diff, json!({"before": {"name": "Old"}, "after": {"name": "New"}}));
    }

    #[test]
    fn audit_entry_redacts_each_diff_side() {
        let entry = AuditLog::new(TenantId::generate(), None, "MEMBER_UPDATE")
            .entity("Membership", "m-1")
            .with_diff(&json!({"before": {"token": "abc"}, "after": {"token": "def", "is_owner": true}}));
        assert_eq!(
            entry.diff,
            Some(json!({"before": {"token": REDACTED}, "after": {"token": REDACTED, "is_owner": true}}))
        );
        assert_eq!(entry.entity_type.as_deref(), Some("Membership"));
    }
}
