//! Idempotency records and request fingerprints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{IdempotencyRecordId, TenantId, UserId};

/// Longest accepted `Idempotency-Key` value, after trimming.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 200;

/// Identity of one logical mutating request.
///
/// Two requests with the same fingerprint are "the same attempt". The method
/// is uppercased and the path never carries a query string, so `?x=1` and
/// `?x=2` on the same route share a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Caller supplied key.
    pub key: String,
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path without query.
    pub path: String,
    /// Acting user, if authenticated.
    pub user_id: Option<UserId>,
    /// Bound tenant, if any.
    pub tenant_id: Option<TenantId>,
}

impl Fingerprint {
    /// Build a fingerprint, normalizing method and path.
    #[must_use]
    pub fn new(
        key: impl Into<String>,
        method: &str,
        path: &str,
        user_id: Option<UserId>,
        tenant_id: Option<TenantId>,
    ) -> Self {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        Self {
            key: key.into(),
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            user_id,
            tenant_id,
        }
    }
}

/// Persisted state of one fingerprint.
///
/// Pending while `status_code` is `None`; complete once the handler
/// succeeded and its exact response body was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Record id.
    pub id: IdempotencyRecordId,
    /// Caller supplied key.
    pub key: String,
    /// HTTP method, uppercase.
    pub method: String,
    /// Request path without query.
    pub path: String,
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Bound tenant.
    pub tenant_id: Option<TenantId>,
    /// Stored status, set on completion.
    pub status_code: Option<u16>,
    /// Stored serialized response body, set on completion.
    pub response_body: Option<String>,
    /// When the key was first seen.
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// A fresh pending record for `fp`.
    #[must_use]
    pub fn pending(fp: &Fingerprint) -> Self {
        Self {
            id: IdempotencyRecordId::generate(),
            key: fp.key.clone(),
            method: fp.method.clone(),
            path: fp.path.clone(),
            user_id: fp.user_id,
            tenant_id: fp.tenant_id,
            status_code: None,
            response_body: None,
            created_at: Utc::now(),
        }
    }

    /// The stored outcome, once complete.
    #[must_use]
    pub fn completed(&self) -> Option<(u16, &str)> {
        match (self.status_code, self.response_body.as_deref()) {
            (Some(status), Some(body)) => Some((status, body)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_normalizes_method_and_path() {
        let fp = Fingerprint::new("k", "patch", "/api/admin/products/1?dry=1", None, None);
        assert_eq!(fp.method, "PATCH");
        assert_eq!(fp.path, "/api/admin/products/1");
    }

    #[test]
    fn pending_record_has_no_outcome() {
        let fp = Fingerprint::new("k", "POST", "/x", Some(UserId::generate()), Some(TenantId::generate()));
        let mut rec = IdempotencyRecord::pending(&fp);
        assert!(rec.completed().is_none());
        rec.status_code = Some(201);
        rec.response_body = Some("{\"ok\":true}".into());
        assert_eq!(rec.completed(), Some((201, "{\"ok\":true}")));
    }
}
